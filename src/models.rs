//! Data models shared by every stage of the pipeline.
//!
//! - [`SourceId`] / [`TimeWindow`] / [`FetchParams`]: what to fetch
//! - [`RawItem`]: a listing exactly as one source describes it
//! - [`TrendingItem`]: the canonical, ranked, possibly translated listing
//! - [`SourceRun`] / [`RunResult`]: the outcome of one run, per source
//! - [`TranslationCacheEntry`]: one persisted translation

use crate::error::SourceError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of listing providers.
///
/// Variant order is the order sources appear in every published document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceId {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "producthunt")]
    ProductHunt,
    #[serde(rename = "hackernews")]
    HackerNews,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::GitHub, SourceId::ProductHunt, SourceId::HackerNews];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::ProductHunt => "producthunt",
            Self::HackerNews => "hackernews",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GitHub => "GitHub Trending",
            Self::ProductHunt => "Product Hunt",
            Self::HackerNews => "Hacker News",
        }
    }

    /// File name prefix of the dated document, e.g. `github-trending-2024-01-01.md`.
    pub fn document_slug(self) -> &'static str {
        match self {
            Self::GitHub => "github-trending",
            Self::ProductHunt => "producthunt",
            Self::HackerNews => "hackernews",
        }
    }

    pub fn homepage(self) -> &'static str {
        match self {
            Self::GitHub => "https://github.com/trending",
            Self::ProductHunt => "https://www.producthunt.com",
            Self::HackerNews => "https://news.ycombinator.com",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source `{s}`"))
    }
}

/// Trending window requested from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Wording used in metric summaries ("stars today", "stars this week").
    pub fn phrase(self) -> &'static str {
        match self {
            Self::Daily => "today",
            Self::Weekly => "this week",
            Self::Monthly => "this month",
        }
    }
}

/// What a fetcher is asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    /// Language (GitHub) or category (Product Hunt) filter. `None` means everything.
    pub filter: Option<String>,
    pub window: TimeWindow,
    pub max_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    /// `owner/name`
    pub full_name: String,
    pub url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub stars_in_window: u64,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductHuntPost {
    pub id: String,
    pub name: String,
    pub url: String,
    pub tagline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HackerNewsStory {
    pub id: u64,
    pub title: String,
    /// Outbound link; `None` for self posts.
    pub url: Option<String>,
    pub text: Option<String>,
    pub score: u64,
    pub comments: u64,
    pub author: Option<String>,
}

/// A listing as returned by a fetcher, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawItem {
    GitHub(GitHubRepo),
    ProductHunt(ProductHuntPost),
    HackerNews(HackerNewsStory),
}

/// The canonical listing shape every document is rendered from.
///
/// `(source_id, external_id, captured_date)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingItem {
    pub source_id: SourceId,
    pub external_id: String,
    pub title: String,
    /// Original-language description; empty when the source has none.
    pub description: String,
    pub description_translated: Option<String>,
    /// Set when a non-empty description could not be translated.
    pub translation_degraded: bool,
    pub url: String,
    /// 1-based position in the source's list for this run.
    pub rank: usize,
    pub metric_summary: String,
    /// Primary programming language, when the source reports one.
    #[serde(default)]
    pub language: Option<String>,
    pub captured_date: NaiveDate,
}

impl TrendingItem {
    /// Text to show readers: the translation when there is one, else the original.
    pub fn display_description(&self) -> &str {
        self.description_translated
            .as_deref()
            .unwrap_or(&self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Ok,
    Partial,
    Failed,
}

/// Outcome of one source within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRun {
    pub items: Vec<TrendingItem>,
    pub status: SourceStatus,
    pub error: Option<SourceError>,
}

impl SourceRun {
    pub fn ok(items: Vec<TrendingItem>) -> Self {
        Self {
            items,
            status: SourceStatus::Ok,
            error: None,
        }
    }

    pub fn partial(items: Vec<TrendingItem>, error: Option<SourceError>) -> Self {
        Self {
            items,
            status: SourceStatus::Partial,
            error,
        }
    }

    pub fn failed(error: SourceError) -> Self {
        Self {
            items: Vec::new(),
            status: SourceStatus::Failed,
            error: Some(error),
        }
    }

    pub fn degraded_count(&self) -> usize {
        self.items.iter().filter(|i| i.translation_degraded).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Partial,
    Failed,
}

/// Everything one run produced, keyed by source in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_date: NaiveDate,
    pub per_source: BTreeMap<SourceId, SourceRun>,
}

impl RunResult {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            per_source: BTreeMap::new(),
        }
    }

    /// `Failed` only when every configured source failed (or none was configured).
    pub fn status(&self) -> RunStatus {
        let total = self.per_source.len();
        let failed = self
            .per_source
            .values()
            .filter(|r| r.status == SourceStatus::Failed)
            .count();
        let ok = self
            .per_source
            .values()
            .filter(|r| r.status == SourceStatus::Ok)
            .count();

        if total == 0 || failed == total {
            RunStatus::Failed
        } else if ok == total {
            RunStatus::Ok
        } else {
            RunStatus::Partial
        }
    }

    /// Sources that produced something worth publishing, in display order.
    pub fn publishable(&self) -> impl Iterator<Item = (SourceId, &SourceRun)> {
        self.per_source
            .iter()
            .filter(|(_, r)| r.status != SourceStatus::Failed && !r.items.is_empty())
            .map(|(id, r)| (*id, r))
    }

    pub fn item_count(&self) -> usize {
        self.per_source.values().map(|r| r.items.len()).sum()
    }
}

/// One persisted translation, keyed by `content_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationCacheEntry {
    pub content_hash: String,
    pub target_lang: String,
    pub translated_text: String,
    pub created_at: DateTime<Utc>,
}
