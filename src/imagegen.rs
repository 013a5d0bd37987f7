//! Keyless text-to-image rendering through Pollinations.

use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::config::ImageSettings;
use crate::error::{Error, Result};
use crate::retry::Backoff;

/// Renders a prompt into encoded image bytes.
pub trait ImageRenderer {
    async fn render(&self, prompt: &str) -> Result<Vec<u8>>;
}

impl<T: ImageRenderer> ImageRenderer for &T {
    async fn render(&self, prompt: &str) -> Result<Vec<u8>> {
        (**self).render(prompt).await
    }
}

#[derive(Debug)]
pub struct PollinationsRenderer {
    client: Client,
    settings: ImageSettings,
    backoff: Backoff,
}

impl PollinationsRenderer {
    pub fn new(settings: &ImageSettings, backoff: Backoff) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings: settings.clone(),
            backoff,
        })
    }

    /// `{base}/prompt/{urlencoded prompt}`; size and model go in the query string.
    pub fn endpoint(&self, prompt: &str) -> String {
        format!(
            "{}/prompt/{}",
            self.settings.base_url.trim_end_matches('/'),
            urlencoding::encode(prompt)
        )
    }

    async fn render_once(&self, prompt: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.endpoint(prompt))
            .query(&[
                ("width", self.settings.width.to_string()),
                ("height", self.settings.height.to_string()),
                ("model", self.settings.model.clone()),
                ("nologo", "true".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::upstream(
                "Pollinations",
                Some(status.as_u16()),
                format!("image request failed with {status}"),
            ));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::upstream(
                "Pollinations",
                Some(status.as_u16()),
                "empty image body",
            ));
        }
        Ok(bytes.to_vec())
    }
}

impl ImageRenderer for PollinationsRenderer {
    #[instrument(level = "info", skip_all, fields(model = %self.settings.model))]
    async fn render(&self, prompt: &str) -> Result<Vec<u8>> {
        let t0 = Instant::now();
        match self
            .backoff
            .run("pollinations.render", || self.render_once(prompt))
            .await
        {
            Ok(bytes) => {
                info!(bytes = bytes.len(), elapsed_ms = t0.elapsed().as_millis(), "Image rendered");
                Ok(bytes)
            }
            Err(e) => {
                warn!(error = %e, elapsed_ms = t0.elapsed().as_millis(), "Image rendering failed");
                Err(e)
            }
        }
    }
}
