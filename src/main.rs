//! # Econ Brief
//!
//! A daily economics news briefing service. Each run picks one new Korean
//! economics article, summarizes it with an LLM, extracts glossary terms,
//! optionally illustrates it, and stores the result in SQLite for the
//! dashboard to display.
//!
//! ## Features
//!
//! - Finds the newest article through NewsAPI, skipping titles stored recently
//! - Scrapes the article body, falling back to the search snippet
//! - Two Gemini passes: an analyst producing structured JSON and a critic
//!   correcting it
//! - Optional illustration: Gemini writes the prompt, Pollinations renders it
//! - Idempotent storage: one row per article URL, one row per glossary term
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEY=... NEWS_API_KEY=... econ_brief run
//! econ_brief schedule
//! econ_brief list --page 2
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Selection**: search and filter candidates ([`scrapers::newsapi`])
//! 2. **Scraping**: extract the article body ([`scrapers::article`])
//! 3. **Analysis**: analyst and critic passes ([`agents`])
//! 4. **Illustration**: prompt, render and save an image ([`imagegen`], [`outputs`])
//! 5. **Storage**: upsert news, terms and links ([`store`])

use clap::Parser;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod agents;
mod cli;
mod config;
mod error;
mod imagegen;
mod llm;
mod models;
mod outputs;
mod pipeline;
mod prompts;
mod retry;
mod schedule;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Settings;
use imagegen::PollinationsRenderer;
use llm::{GeminiClient, RetryGenerate};
use outputs::ImageStore;
use pipeline::{Pipeline, PipelineOptions};
use scrapers::{HtmlScraper, NewsApiClient};
use store::Store;

/// Items per page for `list`, matching the dashboard.
const PAGE_SIZE: u32 = 10;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("econ_brief starting up");

    let args = Cli::parse();
    debug!(command = ?args.command, config = ?args.config, "Parsed CLI arguments");

    let settings = Settings::load(args.config.as_deref()).await?.with_cli(&args);
    let store = Store::open(&settings.database_url).await?;

    let outcome = dispatch(&args.command, &settings, &store).await;
    store.close().await;
    outcome?;

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), millis = elapsed.subsec_millis(), "Execution complete");
    Ok(())
}

type LivePipeline = Pipeline<NewsApiClient, HtmlScraper, RetryGenerate<GeminiClient>, PollinationsRenderer>;

fn build_pipeline(settings: &Settings, store: &Store) -> error::Result<LivePipeline> {
    let llm = RetryGenerate::new(
        GeminiClient::new(&settings.gemini, settings.gemini_api_key.clone())?,
        settings.retry.clone(),
    );
    let search = NewsApiClient::new(
        &settings.news_api,
        settings.news_api_key.clone(),
        settings.retry.clone(),
    )?;
    Ok(Pipeline::new(
        search,
        HtmlScraper::new(&settings.scraper)?,
        llm,
        PollinationsRenderer::new(&settings.images, settings.retry.clone())?,
        store.clone(),
        ImageStore::new(&settings.uploads_dir),
        PipelineOptions::from(settings),
    ))
}

async fn dispatch(command: &Command, settings: &Settings, store: &Store) -> error::Result<()> {
    match command {
        Command::Run => {
            let saved = build_pipeline(settings, store)?.run().await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
        }
        Command::Backfill => {
            let report = build_pipeline(settings, store)?.backfill_images().await?;
            info!(total = report.total, filled = report.filled, failed = report.failed, "Backfill finished");
        }
        Command::Schedule => {
            let pipeline = build_pipeline(settings, store)?;
            let pipeline = &pipeline;
            info!(hour = settings.schedule.hour, minute = settings.schedule.minute, "Scheduler started");
            schedule::run_daily(settings.schedule.hour, settings.schedule.minute, move || {
                pipeline.run()
            })
            .await?;
        }
        Command::List { page } => {
            let page = store.list_news(*page, PAGE_SIZE).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
    }
    Ok(())
}
