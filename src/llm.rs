//! LLM access: the text-generation capability, the Gemini client and the
//! tolerant JSON reader used on every model answer.
//!
//! # Architecture
//!
//! - [`Generate`]: one request, ordered text parts in, one completion out
//! - [`GeminiClient`]: REST client for `models/{model}:generateContent`
//! - [`RetryGenerate`]: decorator that adds exponential backoff to any [`Generate`]
//! - [`parse_json_safe`] / [`parse_json_with`]: strip markdown fences and surrounding
//!   prose before parsing
//!
//! Retries only cover the transport. A completion that does not parse is never
//! re-requested; the calling agent decides what a parse failure means.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::config::GeminiSettings;
use crate::error::{Error, Result};
use crate::retry::Backoff;
use crate::utils::truncate_for_log;

/// Async text generation.
///
/// Implementors send the parts, in order, as a single user turn and return
/// the model's text.
pub trait Generate {
    async fn generate(&self, parts: &[String]) -> Result<String>;
}

impl<T: Generate> Generate for &T {
    async fn generate(&self, parts: &[String]) -> Result<String> {
        (**self).generate(parts).await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Google Gemini REST client.
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl Generate for GeminiClient {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn generate(&self, parts: &[String]) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is missing".into()))?;

        let body = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: parts.iter().map(|p| RequestPart { text: p }).collect(),
            }],
        };

        let t0 = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis(), "Gemini call failed");
            return Err(Error::upstream(
                "Gemini",
                Some(status.as_u16()),
                truncate_for_log(&detail, 300),
            ));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::MalformedOutput("Gemini returned no text".into()));
        }
        info!(elapsed_ms = t0.elapsed().as_millis(), chars = text.chars().count(), "Gemini call succeeded");
        Ok(text)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Generate`].
pub struct RetryGenerate<T> {
    inner: T,
    backoff: Backoff,
}

impl<T: Generate> RetryGenerate<T> {
    pub fn new(inner: T, backoff: Backoff) -> Self {
        Self { inner, backoff }
    }
}

impl<T> fmt::Debug for RetryGenerate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerate")
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<T: Generate> Generate for RetryGenerate<T> {
    async fn generate(&self, parts: &[String]) -> Result<String> {
        self.backoff
            .run("llm.generate", || self.inner.generate(parts))
            .await
    }
}

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?").expect("static regex"));

/// Read a JSON value out of a free-form model answer.
///
/// Same reading as [`parse_json_with`] where any JSON value is accepted.
pub fn parse_json_safe(text: &str) -> Result<Value> {
    parse_json_with(text, Ok)
}

/// Read a free-form model answer into `T`, trying progressively narrower slices.
///
/// Markdown fence markers are removed and the remaining text is tried as-is,
/// then sliced from the first `[` to the last `]`, then from the first `{` to
/// the last `}`. The first slice that is valid JSON and that `accept` turns into
/// a `T` wins, so an object wrapped in prose is not mistaken for the array it
/// contains.
///
/// # Returns
///
/// The accepted value, or the last rejection as [`Error::MalformedOutput`].
pub fn parse_json_with<T>(text: &str, accept: impl Fn(Value) -> Result<T>) -> Result<T> {
    let clean = CODE_FENCE.replace_all(text, "");
    let clean = clean.trim();

    let mut last_err = Error::MalformedOutput("AI response is empty".into());
    for candidate in json_slices(clean) {
        let attempt = serde_json::from_str::<Value>(candidate)
            .map_err(|e| Error::MalformedOutput(format!("AI response is not valid JSON: {e}")))
            .and_then(&accept);
        match attempt {
            Ok(value) => return Ok(value),
            Err(e) => last_err = e,
        }
    }

    error!(
        error = %last_err,
        response_preview = %truncate_for_log(text, 50),
        "Model answer is not usable JSON"
    );
    Err(last_err)
}

fn json_slices(clean: &str) -> Vec<&str> {
    let mut slices = vec![clean];
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(first), Some(last)) = (clean.find(open), clean.rfind(close)) {
            if first < last && !slices.contains(&&clean[first..=last]) {
                slices.push(&clean[first..=last]);
            }
        }
    }
    slices
}
