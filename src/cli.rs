//! Command-line interface definitions.
//!
//! Global options override the YAML configuration; credentials are normally
//! supplied through the environment (or a `.env` file).

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Collect trending listings, translate them and publish dated digests.
///
/// # Examples
///
/// ```sh
/// # One run with defaults, output in ./docs
/// trending_digest run
///
/// # Custom config and output directory
/// trending_digest -c digest.yaml -o ./site/docs run
///
/// # What did the last run do?
/// trending_digest -o ./site/docs status
///
/// # Run every day at 05:00 local time
/// trending_digest schedule --at 05:00 --run-now
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the Markdown documents are written to
    #[arg(short, long, global = true, env = "DIGEST_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Target language code for translated descriptions (e.g. `zh`, `ja`)
    #[arg(short = 'l', long, global = true)]
    pub target_language: Option<String>,

    /// Run-level deadline in seconds
    #[arg(long, global = true)]
    pub deadline_secs: Option<u64>,

    /// API key for the translation endpoint
    #[arg(long, global = true, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible translation endpoint
    #[arg(long, global = true, env = "DEEPSEEK_BASE_URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Execute the pipeline once (the default)
    Run {
        /// Run date to publish under (`YYYY-MM-DD`); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the record of the most recent run
    Status,
    /// Run once a day at a fixed local time
    Schedule {
        /// Local time of day, `HH:MM`
        #[arg(long, default_value = "05:00", value_parser = parse_time_of_day)]
        at: NaiveTime,
        /// Also run immediately on start-up
        #[arg(long)]
        run_now: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run { date: None })
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM ({e})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["trending_digest"]);
        assert_eq!(cli.command(), Command::Run { date: None });
    }

    #[test]
    fn test_run_with_date() {
        let cli = Cli::parse_from(["trending_digest", "-o", "./out", "run", "--date", "2024-01-01"]);
        assert_eq!(cli.output_dir, Some(PathBuf::from("./out")));
        assert_eq!(
            cli.command(),
            Command::Run {
                date: NaiveDate::from_ymd_opt(2024, 1, 1)
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["trending_digest", "status", "--output-dir", "/tmp/x"]);
        assert_eq!(cli.command(), Command::Status);
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_schedule_time_parsing() {
        let cli = Cli::parse_from(["trending_digest", "schedule", "--at", "07:30", "--run-now"]);
        assert_eq!(
            cli.command(),
            Command::Schedule {
                at: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
                run_now: true
            }
        );
        assert!(Cli::try_parse_from(["trending_digest", "schedule", "--at", "7pm"]).is_err());
    }
}
