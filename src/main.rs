//! # Trending Digest
//!
//! Collects the day's trending listings from several public sources,
//! translates their descriptions, and publishes them as dated Markdown
//! documents plus a "today" page and a history index.
//!
//! ## Features
//!
//! - Sources: GitHub Trending, Product Hunt, Hacker News
//! - Translation through an OpenAI-compatible chat-completions API (DeepSeek),
//!   backed by a persistent content-addressed cache
//! - One failing source never stops the others; untranslatable descriptions
//!   are published in their original language and flagged
//! - Idempotent re-runs: same input, byte-identical documents
//!
//! ## Usage
//!
//! ```sh
//! trending_digest -o ./docs run
//! trending_digest -o ./docs status
//! trending_digest schedule --at 05:00 --run-now
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: every enabled source is fetched concurrently, with a
//!    per-attempt timeout and retries
//! 2. **Normalizing**: raw listings become ranked `TrendingItem`s
//! 3. **Translating**: descriptions go through the cache, then the API
//! 4. **Publishing**: dated documents, `index.md`, `history.md`, run record

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod cli;
mod config;
mod coordinator;
mod error;
mod models;
mod normalize;
mod outputs;
mod retry;
mod scrapers;
mod translate;
mod utils;

use cli::{Cli, Command};
use config::PipelineConfig;
use coordinator::{ExitStatus, RunCoordinator};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded .env");
    }

    let args = Cli::parse();
    debug!(config = ?args.config, output_dir = ?args.output_dir, "Parsed CLI arguments");

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    config.apply_cli(&args);
    config.validate()?;

    match args.command() {
        Command::Status => {
            match coordinator::last_run(&config)? {
                Some(record) => println!("{}", coordinator::render_status(&record)),
                None => println!("No run recorded under {}", config.output_dir.display()),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { date } => {
            if let Err(e) = ensure_writable_dir(&config.output_dir).await {
                error!(
                    path = %config.output_dir.display(),
                    error = %e,
                    "Output directory is not writable (fix perms or choose a different path)"
                );
                return Ok(ExitCode::from(ExitStatus::Failure.code()));
            }
            let run_date = date.unwrap_or_else(|| Local::now().date_naive());
            let coordinator = RunCoordinator::from_config(config)?;
            let report = coordinator.execute_once(run_date).await;
            Ok(ExitCode::from(report.exit.code()))
        }
        Command::Schedule { at, run_now } => {
            ensure_writable_dir(&config.output_dir).await?;
            let coordinator = RunCoordinator::from_config(config)?;
            coordinator.schedule(at, run_now).await;
            info!("Scheduler stopped");
            Ok(ExitCode::SUCCESS)
        }
    }
}
