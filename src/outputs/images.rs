//! Generated images on local disk.
//!
//! Files land directly in the uploads directory. The path stored in the
//! database is relative to the dashboard's static root: `uploads/<file>`.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;
use crate::utils::{ensure_writable_dir, sanitize_filename};

/// URL prefix under which the dashboard serves the uploads directory.
pub const PUBLIC_PREFIX: &str = "uploads";

/// The uploads directory generated images are written to.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if needed and fail early when it is not writable.
    pub async fn prepare(&self) -> Result<()> {
        ensure_writable_dir(&self.dir).await
    }

    /// Write one image into the uploads directory.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Encoded image data, written as-is
    /// * `suggested_name` - File stem; non-alphanumerics become `_` and it is lowercased
    ///
    /// # Returns
    ///
    /// The public path `uploads/<name>_<unix millis>.jpg` to store with the row.
    #[instrument(level = "info", skip_all, fields(dir = %self.dir.display(), %suggested_name))]
    pub async fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        let file_name = format!(
            "{}_{}.jpg",
            sanitize_filename(suggested_name),
            Utc::now().timestamp_millis()
        );
        let path = self.dir.join(&file_name);

        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "Image saved");

        Ok(format!("{PUBLIC_PREFIX}/{file_name}"))
    }
}
