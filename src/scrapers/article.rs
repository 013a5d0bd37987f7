//! Best-effort article body extraction.
//!
//! Publishers serve very different markup, so extraction is deliberately
//! generic: chrome and ads are cut out, then a short list of content
//! containers is tried in priority order (Naver and Daum article bodies first,
//! then semantic and common containers), falling back to the whole `<body>`.
//!
//! Scraping never fails the pipeline. Timeouts, network errors, error statuses
//! and unparsable URLs are logged and reported as an empty body.

use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::ScraperSettings;
use crate::error::Result;
use crate::utils::{collapse_whitespace, truncate_chars};

/// Subtrees removed before any text is read.
static NOISE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script, style, noscript, header, footer, nav, .advertising")
        .expect("static selector")
});

/// Content containers, most specific first.
static CONTENT: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["#dic_area", ".article_view", "article", ".content", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});

/// Fetches a page and returns its readable text, or `""` on any failure.
pub trait PageScraper {
    async fn scrape(&self, url: &str) -> String;
}

impl<T: PageScraper> PageScraper for &T {
    async fn scrape(&self, url: &str) -> String {
        (**self).scrape(url).await
    }
}

#[derive(Debug)]
pub struct HtmlScraper {
    client: Client,
    user_agent: String,
    max_chars: usize,
}

impl HtmlScraper {
    pub fn new(settings: &ScraperSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            user_agent: settings.user_agent.clone(),
            max_chars: settings.max_chars,
        })
    }

    async fn fetch_html(&self, url: &str) -> std::result::Result<String, String> {
        let url = Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {status}"));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}

impl PageScraper for HtmlScraper {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn scrape(&self, url: &str) -> String {
        match self.fetch_html(url).await {
            Ok(html) => {
                let text = extract_text(&html, self.max_chars);
                info!(chars = text.chars().count(), "Scraped article body");
                text
            }
            Err(e) => {
                warn!(error = %e, "Scrape failed; continuing without body");
                String::new()
            }
        }
    }
}

/// Strip noise, pick the first content container with text, normalize and cap it.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let mut document = Html::parse_document(html);

    let noise: Vec<_> = document.select(&NOISE).map(|el| el.id()).collect();
    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    for selector in CONTENT.iter() {
        let text = document
            .select(selector)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" ");
        let text = collapse_whitespace(&text);
        if !text.is_empty() {
            return truncate_chars(&text, max_chars);
        }
    }
    String::new()
}
