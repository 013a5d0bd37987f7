//! Command-line interface definitions.
//!
//! Credentials are read from flags or the environment; everything else can
//! also come from the YAML settings file passed with `--config`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # One pipeline run with settings from a file
/// econ_brief --config brief.yaml run
///
/// # Daily at the configured time, without images
/// econ_brief --no-images schedule
///
/// # Retry images for stored news that has none
/// econ_brief backfill
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite connection URL (overrides the settings file)
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Directory where generated images are written
    #[arg(long, env = "UPLOADS_DIR", global = true)]
    pub uploads_dir: Option<PathBuf>,

    /// Skip image generation during `run`
    #[arg(long, global = true)]
    pub no_images: bool,

    /// Google Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    /// NewsAPI key
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true, global = true)]
    pub news_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Process today's article once and print what was stored
    Run,
    /// Generate images for stored news that has none
    Backfill,
    /// Run the pipeline every day at the configured local time
    Schedule,
    /// Print a page of stored news with its glossary terms
    List {
        /// 1-based page number
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["econ_brief", "--config", "brief.yaml", "run"]);
        assert_eq!(cli.config, Some(PathBuf::from("brief.yaml")));
        assert_eq!(cli.command, Command::Run);
        assert!(!cli.no_images);
    }

    #[test]
    fn test_list_page_default_and_short_flag() {
        let cli = Cli::parse_from(["econ_brief", "list"]);
        assert_eq!(cli.command, Command::List { page: 1 });

        let cli = Cli::parse_from(["econ_brief", "list", "-p", "3"]);
        assert_eq!(cli.command, Command::List { page: 3 });
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["econ_brief", "backfill", "--uploads-dir", "/srv/uploads"]);
        assert_eq!(cli.command, Command::Backfill);
        assert_eq!(cli.uploads_dir, Some(PathBuf::from("/srv/uploads")));
    }
}
