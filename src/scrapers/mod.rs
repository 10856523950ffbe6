//! Source fetchers for trending listings.
//!
//! Every source implements [`SourceFetcher`]: given [`FetchParams`] it returns
//! raw listings, best first, in the order the source ranks them. Fetchers are
//! registered in a [`SourceRegistry`] keyed by [`SourceId`]; the aggregator
//! only ever talks to the registry.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | GitHub Trending | [`github`] | HTML scraping | language filter + daily/weekly/monthly |
//! | Product Hunt | [`producthunt`] | Atom feed | optional category filter |
//! | Hacker News | [`hackernews`] | Firebase JSON API | top stories (daily) / best stories |
//!
//! # Failure Handling
//!
//! Fetchers report every failure as a [`SourceError`]. [`fetch_source`] wraps a
//! fetcher with a per-attempt timeout and the fetch [`RetryPolicy`], and never
//! lets an error escape as anything other than a `SourceError`.

use crate::config::SourceConfig;
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{FetchParams, RawItem, SourceId};
use crate::retry::{RetryPolicy, retry_async};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

pub mod github;
pub mod hackernews;
pub mod producthunt;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// The one capability every source offers.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Raw listings, best first. Implementations may return more than
    /// `params.max_items`; the normalizer truncates.
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, SourceError>;
}

/// Fetchers keyed by source.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    fetchers: BTreeMap<SourceId, Arc<dyn SourceFetcher>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the real fetcher for every [`SourceId`].
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        let client = http_client()?;
        let mut registry = Self::new();
        registry.register(Arc::new(github::GitHubTrending::new(client.clone())));
        registry.register(Arc::new(producthunt::ProductHuntFeed::new(client.clone())));
        registry.register(Arc::new(hackernews::HackerNewsTop::new(client)));
        Ok(registry)
    }

    /// Add or replace the fetcher for `fetcher.source_id()`.
    pub fn register(&mut self, fetcher: Arc<dyn SourceFetcher>) {
        self.fetchers.insert(fetcher.source_id(), fetcher);
    }

    pub fn get(&self, id: SourceId) -> Option<Arc<dyn SourceFetcher>> {
        self.fetchers.get(&id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.fetchers.keys().copied()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.fetchers.keys()).finish()
    }
}

/// Shared HTTP client with a browser-like user agent.
pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// Turn a non-success HTTP status into a [`SourceError`].
pub(crate) fn check_status(source_id: SourceId, resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let kind = if status.as_u16() == 429 {
        SourceErrorKind::RateLimit
    } else {
        SourceErrorKind::Network
    };
    Err(SourceError::new(
        source_id,
        kind,
        format!("{} returned HTTP {}", resp.url(), status),
    ))
}

/// GET `url` and return the body as text, classifying every failure.
pub(crate) async fn get_text(
    client: &Client,
    source_id: SourceId,
    url: &str,
) -> Result<String, SourceError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(source_id, &e))?;
    check_status(source_id, resp)?
        .text()
        .await
        .map_err(|e| SourceError::from_reqwest(source_id, &e))
}

/// Fetch one configured source with a per-attempt timeout and retries.
///
/// A source with no registered fetcher fails with
/// [`SourceErrorKind::Unconfigured`].
#[instrument(level = "info", skip_all, fields(source = %config.id))]
pub async fn fetch_source(
    registry: &SourceRegistry,
    config: &SourceConfig,
    policy: &RetryPolicy,
) -> Result<Vec<RawItem>, SourceError> {
    let Some(fetcher) = registry.get(config.id) else {
        warn!("No fetcher registered");
        return Err(SourceError::new(
            config.id,
            SourceErrorKind::Unconfigured,
            "no fetcher registered for this source",
        ));
    };

    let params = config.params();
    let timeout = config.timeout();
    let t0 = Instant::now();

    let result = retry_async(
        policy,
        config.id.as_str(),
        || {
            let fetcher = Arc::clone(&fetcher);
            let params = params.clone();
            async move {
                match tokio::time::timeout(timeout, fetcher.fetch(&params)).await {
                    Ok(res) => res,
                    Err(_) => Err(SourceError::new(
                        fetcher.source_id(),
                        SourceErrorKind::Timeout,
                        format!("attempt exceeded {}s", timeout.as_secs()),
                    )),
                }
            }
        },
        |e: &SourceError| e.kind.is_retryable(),
    )
    .await;

    match &result {
        Ok(items) => info!(
            count = items.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched source"
        ),
        Err(e) => warn!(kind = ?e.kind, error = %e, "Source fetch failed"),
    }
    result
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable fetcher shared by aggregator and coordinator tests.

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeFetcher {
        pub id: SourceId,
        /// Responses handed out in order; the last one repeats.
        pub script: Mutex<Vec<Result<Vec<RawItem>, SourceError>>>,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn ok(id: SourceId, items: Vec<RawItem>) -> Self {
            Self::scripted(id, vec![Ok(items)])
        }

        pub fn failing(id: SourceId, kind: SourceErrorKind) -> Self {
            Self::scripted(id, vec![Err(SourceError::new(id, kind, "scripted failure"))])
        }

        pub fn scripted(id: SourceId, script: Vec<Result<Vec<RawItem>, SourceError>>) -> Self {
            Self {
                id,
                script: Mutex::new(script),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        fn source_id(&self) -> SourceId {
            self.id
        }

        async fn fetch(&self, _params: &FetchParams) -> Result<Vec<RawItem>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    pub fn hn_story(id: u64, title: &str, text: Option<&str>) -> RawItem {
        RawItem::HackerNews(crate::models::HackerNewsStory {
            id,
            title: title.to_string(),
            url: Some(format!("https://example.com/{id}")),
            text: text.map(str::to_string),
            score: 100 + id,
            comments: id,
            author: Some("pg".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn cfg(id: SourceId, timeout_secs: u64) -> SourceConfig {
        SourceConfig {
            timeout_secs,
            ..SourceConfig::new(id)
        }
    }

    #[tokio::test]
    async fn test_unregistered_source_is_unconfigured() {
        let registry = SourceRegistry::new();
        let err = fetch_source(&registry, &cfg(SourceId::GitHub, 1), &RetryPolicy::immediate(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Unconfigured);
    }

    #[tokio::test]
    async fn test_network_failures_are_retried() {
        let fake = Arc::new(FakeFetcher::scripted(
            SourceId::HackerNews,
            vec![
                Err(SourceError::new(SourceId::HackerNews, SourceErrorKind::Network, "reset")),
                Ok(vec![hn_story(1, "Show HN", None)]),
            ],
        ));
        let mut registry = SourceRegistry::new();
        registry.register(fake.clone());

        let items = fetch_source(&registry, &cfg(SourceId::HackerNews, 5), &RetryPolicy::immediate(2))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn test_parse_failures_are_not_retried() {
        let fake = Arc::new(FakeFetcher::failing(SourceId::GitHub, SourceErrorKind::Parse));
        let mut registry = SourceRegistry::new();
        registry.register(fake.clone());

        let err = fetch_source(&registry, &cfg(SourceId::GitHub, 5), &RetryPolicy::immediate(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Parse);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out_after_all_attempts() {
        let fake = Arc::new(
            FakeFetcher::ok(SourceId::ProductHunt, vec![]).with_delay(Duration::from_secs(5)),
        );
        let mut registry = SourceRegistry::new();
        registry.register(fake.clone());

        let mut config = cfg(SourceId::ProductHunt, 0);
        config.timeout_secs = 0;
        let err = fetch_source(&registry, &config, &RetryPolicy::immediate(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SourceErrorKind::Timeout);
        assert_eq!(fake.calls(), 3);
    }

    #[test]
    fn test_registry_with_defaults_covers_every_source() {
        let registry = SourceRegistry::with_defaults().unwrap();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, SourceId::ALL.to_vec());
    }
}
