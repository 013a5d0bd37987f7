//! Runtime settings.
//!
//! Every tunable has a default so the service runs without a settings file.
//! An optional YAML file (`--config`) overrides the defaults, and the CLI
//! flags and environment variables in [`crate::cli::Cli`] override the file.
//!
//! ```yaml
//! database_url: sqlite://news.db
//! uploads_dir: public/uploads
//! news_api:
//!   query: 경제
//!   page_size: 20
//! gemini:
//!   model: gemini-2.5-flash
//! images:
//!   enabled: true
//!   backfill_delay_ms: 2000
//! schedule:
//!   hour: 9
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::cli::Cli;
use crate::error::Result;
use crate::retry::Backoff;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub uploads_dir: PathBuf,
    pub news_api: NewsApiSettings,
    pub gemini: GeminiSettings,
    pub scraper: ScraperSettings,
    pub analysis: AnalysisSettings,
    pub images: ImageSettings,
    pub schedule: ScheduleSettings,
    pub retry: Backoff,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,
    #[serde(skip)]
    pub news_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://news.db".to_string(),
            uploads_dir: PathBuf::from("public/uploads"),
            news_api: NewsApiSettings::default(),
            gemini: GeminiSettings::default(),
            scraper: ScraperSettings::default(),
            analysis: AnalysisSettings::default(),
            images: ImageSettings::default(),
            schedule: ScheduleSettings::default(),
            retry: Backoff::default(),
            gemini_api_key: None,
            news_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsApiSettings {
    pub base_url: String,
    pub query: String,
    pub language: String,
    pub sort_by: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for NewsApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org".to_string(),
            query: "경제".to_string(),
            language: "ko".to_string(),
            sort_by: "publishedAt".to_string(),
            page_size: 20,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Cap on extracted characters, bounding the analysis prompt.
    pub max_chars: usize,
    /// Bodies shorter than this are replaced by the search snippet.
    pub min_chars: usize,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            max_chars: 5_000,
            min_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Claims dated before `today - lookback_days` are treated as stale.
    pub lookback_days: i64,
    /// How many recent stored titles are excluded from selection.
    pub recent_titles: i64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            lookback_days: 100,
            recent_titles: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub enabled: bool,
    pub base_url: String,
    pub width: u32,
    pub height: u32,
    pub model: String,
    pub timeout_secs: u64,
    pub backfill_delay_ms: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://image.pollinations.ai".to_string(),
            width: 800,
            height: 600,
            model: "flux".to_string(),
            timeout_secs: 60,
            backfill_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub hour: u32,
    pub minute: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self { hour: 9, minute: 0 }
    }
}

impl Settings {
    /// Parse a YAML settings document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read the YAML settings file, or fall back to defaults when `path` is `None`.
    #[instrument(level = "info", skip_all)]
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let text = tokio::fs::read_to_string(p).await?;
                let settings = Self::from_yaml(&text)?;
                info!(path = %p.display(), "Loaded settings file");
                Ok(settings)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line and environment overrides.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(dir) = &cli.uploads_dir {
            self.uploads_dir = dir.clone();
        }
        if cli.no_images {
            self.images.enabled = false;
        }
        self.gemini_api_key = cli.gemini_api_key.clone();
        self.news_api_key = cli.news_api_key.clone();
        self
    }
}
