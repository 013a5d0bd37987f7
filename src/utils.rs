//! Utility functions for dates, string handling and file system checks.
//!
//! This module provides helpers used throughout the application:
//! - Prompt date bounds (today and N days ago)
//! - String truncation and whitespace collapsing for logs and scraped text
//! - Filename sanitization for stored images
//! - File system validation for the uploads directory

use chrono::{Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]").expect("static regex"));

/// Today's date and the date `lookback_days` earlier, both `YYYY-MM-DD` (UTC).
///
/// The analysis prompt uses the pair to tell the model which claims are stale.
pub fn date_bounds(lookback_days: i64) -> (String, String) {
    date_bounds_from(Utc::now().date_naive(), lookback_days)
}

pub fn date_bounds_from(today: NaiveDate, lookback_days: i64) -> (String, String) {
    let past = today - Duration::days(lookback_days);
    (
        today.format("%Y-%m-%d").to_string(),
        past.format("%Y-%m-%d").to_string(),
    )
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes on a character boundary, with
/// the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max_chars` characters (not bytes).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Replace every non-ASCII-alphanumeric character with `_` and lowercase the rest.
pub fn sanitize_filename(name: &str) -> String {
    NON_ALNUM.replace_all(name, "_").to_lowercase()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    // A sync probe keeps the error surface simple.
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Uploads directory is writable");
    Ok(())
}
