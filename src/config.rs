//! Pipeline configuration.
//!
//! Everything has a default so the tool runs without a config file. A YAML
//! file can override any field, and CLI flags / environment variables
//! override the file (see [`PipelineConfig::apply_cli`]).
//!
//! ```yaml
//! output_dir: ./docs
//! target_language: zh
//! today_top_n: 5
//! run_deadline_secs: 300
//! sources:
//!   - id: github
//!     filter: rust
//!     window: weekly
//!   - id: hackernews
//! translator:
//!   model: deepseek-chat
//! ```

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::models::{FetchParams, SourceId, TimeWindow};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Upper bound on concurrently processed sources.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub target_language: String,
    /// Items per source on the "today" page.
    pub today_top_n: usize,
    pub run_deadline_secs: u64,
    /// Defaults to the number of enabled sources.
    pub max_workers: Option<usize>,
    /// Concurrent translations within one source.
    pub translate_concurrency: usize,
    pub sources: Vec<SourceConfig>,
    pub fetch_retry: RetryPolicy,
    pub translate_retry: RetryPolicy,
    pub translator: TranslatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./docs"),
            target_language: "zh".to_string(),
            today_top_n: 5,
            run_deadline_secs: 300,
            max_workers: None,
            translate_concurrency: 4,
            sources: SourceId::ALL.into_iter().map(SourceConfig::new).collect(),
            fetch_retry: RetryPolicy::for_fetch(),
            translate_retry: RetryPolicy::for_translation(),
            translator: TranslatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub window: TimeWindow,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_items() -> usize {
    25
}

fn default_timeout_secs() -> u64 {
    30
}

impl SourceConfig {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            enabled: true,
            filter: None,
            window: TimeWindow::Daily,
            max_items: default_max_items(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn params(&self) -> FetchParams {
        FetchParams {
            filter: self.filter.clone().filter(|f| !f.trim().is_empty()),
            window: self.window,
            max_items: self.max_items,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// OpenAI-compatible chat-completions endpoint used for translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Defaults to `<output_dir>/data/translation_cache.json`.
    pub cache_path: Option<PathBuf>,
    /// Never read from YAML; comes from `--api-key` / `DEEPSEEK_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            request_timeout_secs: 30,
            cache_path: None,
            api_key: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file, or defaults when `path` is `None`.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), sources = config.sources.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Overlay command-line / environment values on top of the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(lang) = &cli.target_language {
            self.target_language = lang.clone();
        }
        if let Some(secs) = cli.deadline_secs {
            self.run_deadline_secs = secs;
        }
        if let Some(url) = &cli.base_url {
            self.translator.base_url = url.clone();
        }
        if cli.api_key.is_some() {
            self.translator.api_key = cli.api_key.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_language.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "target_language",
                message: "must not be empty".to_string(),
            });
        }
        if self.today_top_n == 0 {
            return Err(ConfigError::Invalid {
                field: "today_top_n",
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(src) = self.sources.iter().find(|s| s.max_items == 0) {
            return Err(ConfigError::Invalid {
                field: "sources.max_items",
                message: format!("{} has max_items = 0", src.id),
            });
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> Vec<SourceConfig> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }

    /// Worker limit: configured value or source count, clamped to `1..=8`.
    pub fn workers(&self) -> usize {
        let wanted = self
            .max_workers
            .unwrap_or_else(|| self.enabled_sources().len());
        wanted.clamp(1, MAX_WORKERS)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.output_dir.join("data")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.translator
            .cache_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join("translation_cache.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_cover_all_sources() {
        let c = PipelineConfig::default();
        assert_eq!(c.sources.len(), 3);
        assert_eq!(c.today_top_n, 5);
        assert_eq!(c.run_deadline(), Duration::from_secs(300));
        assert_eq!(c.workers(), 3);
        assert!(c.sources.iter().all(|s| s.max_items == 25 && s.timeout_secs == 30));
        assert_eq!(c.fetch_retry.max_retries, 2);
        assert_eq!(c.translate_retry.max_retries, 3);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
target_language: ja
sources:
  - id: github
    filter: rust
    window: weekly
  - id: hackernews
    enabled: false
"#;
        let c = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(c.target_language, "ja");
        assert_eq!(c.today_top_n, 5);
        assert_eq!(c.sources.len(), 2);
        assert_eq!(c.sources[0].window, TimeWindow::Weekly);
        assert_eq!(c.sources[0].max_items, 25);
        assert_eq!(c.sources[0].params().filter.as_deref(), Some("rust"));
        assert_eq!(c.enabled_sources().len(), 1);
        assert_eq!(c.workers(), 1);
    }

    #[test]
    fn test_workers_are_capped() {
        let c = PipelineConfig {
            max_workers: Some(64),
            ..PipelineConfig::default()
        };
        assert_eq!(c.workers(), MAX_WORKERS);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut c = PipelineConfig::default();
        let cli = Cli::parse_from([
            "trending_digest",
            "--output-dir",
            "/tmp/site",
            "--target-language",
            "de",
            "--api-key",
            "sk-test",
            "run",
        ]);
        c.apply_cli(&cli);
        assert_eq!(c.output_dir, PathBuf::from("/tmp/site"));
        assert_eq!(c.target_language, "de");
        assert_eq!(c.translator.api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            c.cache_path(),
            PathBuf::from("/tmp/site/data/translation_cache.json")
        );
    }

    #[test]
    fn test_validate_rejects_zero_top_n() {
        let c = PipelineConfig {
            today_top_n: 0,
            ..PipelineConfig::default()
        };
        assert!(c.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
