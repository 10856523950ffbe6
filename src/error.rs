//! Typed errors for fetching, translating, publishing and configuration.
//!
//! Errors that end up in a [`RunResult`](crate::models::RunResult) or a run
//! record are `Clone + Serialize` so they can be kept for inspection after the
//! run and written next to the published documents.

use crate::models::SourceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong while fetching a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Transport failure or non-success HTTP status.
    Network,
    /// The payload could not be understood.
    Parse,
    /// The source told us to slow down (HTTP 429).
    RateLimit,
    /// An attempt exceeded its time budget, or the run deadline expired.
    Timeout,
    /// The source is configured but no fetcher is registered for it.
    Unconfigured,
}

impl SourceErrorKind {
    /// Whether another attempt has a chance of succeeding.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::Timeout)
    }
}

/// A failure contained at the source boundary.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{source_id} fetch failed ({kind:?}): {message}")]
pub struct SourceError {
    pub source_id: SourceId,
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(source_id: SourceId, kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            source_id,
            kind,
            message: message.into(),
        }
    }

    /// Classify a `reqwest` failure.
    pub fn from_reqwest(source_id: SourceId, e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            SourceErrorKind::Timeout
        } else if e.status().map(|s| s.as_u16()) == Some(429) {
            SourceErrorKind::RateLimit
        } else if e.is_decode() {
            SourceErrorKind::Parse
        } else {
            SourceErrorKind::Network
        };
        Self::new(source_id, kind, e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationErrorKind {
    /// Rate limit, network, upstream hiccup. Worth retrying.
    Transient,
    /// Empty input, unsupported language, rejected credentials. Never retried.
    Permanent,
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("translation failed ({kind:?}): {message}")]
pub struct TranslationError {
    pub kind: TranslationErrorKind,
    pub message: String,
}

impl TranslationError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TranslationErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: TranslationErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == TranslationErrorKind::Transient
    }
}

/// A document that could not be committed. Fatal for that document only.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishError {
    #[error("failed to write {path}: {message}")]
    IoFailure { path: String, message: String },
    /// The document could not be rendered, or an existing index could not be read back.
    #[error("failed to render {path}: {message}")]
    Render { path: String, message: String },
}

impl PublishError {
    pub fn io(path: &std::path::Path, e: &std::io::Error) -> Self {
        Self::IoFailure {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }

    pub fn render(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Self::Render {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::IoFailure { path, .. } | Self::Render { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} is not valid JSON: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_failures_are_retryable() {
        assert!(SourceErrorKind::Network.is_retryable());
        assert!(SourceErrorKind::RateLimit.is_retryable());
        assert!(SourceErrorKind::Timeout.is_retryable());
        assert!(!SourceErrorKind::Parse.is_retryable());
        assert!(!SourceErrorKind::Unconfigured.is_retryable());
    }

    #[test]
    fn test_source_error_display_names_the_source() {
        let e = SourceError::new(SourceId::GitHub, SourceErrorKind::Parse, "no rows");
        let s = e.to_string();
        assert!(s.contains("github"));
        assert!(s.contains("no rows"));
    }

    #[test]
    fn test_source_error_serializes_kind_in_snake_case() {
        let e = SourceError::new(SourceId::HackerNews, SourceErrorKind::RateLimit, "slow down");
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"rate_limit\""));
        assert!(json.contains("\"hackernews\""));
    }
}
