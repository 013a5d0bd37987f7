//! Crate-wide error type.
//!
//! Every stage of the pipeline reports failures through [`Error`]. The variants
//! follow the failure classes the orchestrator distinguishes: configuration
//! problems are fatal, upstream failures may be retried or downgraded by the
//! stage that owns them, and malformed model output is fatal for analysis but
//! tolerated by the critique pass.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A credential or setting required by the current operation is missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external service answered, but not successfully.
    #[error("{service} error (status {status:?}): {message}")]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model response could not be read as the expected JSON.
    #[error("Malformed AI output: {0}")]
    MalformedOutput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn upstream(service: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            status,
            message: message.into(),
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Timeouts, connection failures, `429` and `5xx` answers are transient.
    /// Configuration problems, client errors and malformed output are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Upstream { status: Some(s), .. } => *s == 429 || *s >= 500,
            Error::Upstream { status: None, .. } => true,
            Error::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                match e.status() {
                    Some(s) => s.as_u16() == 429 || s.is_server_error(),
                    None => e.is_request(),
                }
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
