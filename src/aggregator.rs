//! Fan-out/fan-in of one run across every configured source.
//!
//! Each source is one unit of work: fetch (with timeout and retries),
//! normalize, then translate its items. Units run concurrently, bounded by
//! the worker limit, and their results are collected into a [`RunResult`].
//! A failing source never affects the others.
//!
//! The run deadline is enforced here. Work still outstanding when it expires
//! is dropped (cancelling its in-flight requests); whatever it had finished is
//! kept:
//!
//! - fetched and normalized, translation incomplete -> `Partial`, untranslated
//!   items degraded
//! - not fetched yet -> `Failed` with [`SourceErrorKind::Timeout`]

use crate::config::SourceConfig;
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{RunResult, SourceId, SourceRun, TrendingItem};
use crate::normalize::normalize_all;
use crate::retry::RetryPolicy;
use crate::scrapers::{SourceRegistry, fetch_source};
use crate::translate::{TranslationBackend, Translator};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

type Progress = Mutex<BTreeMap<SourceId, Vec<TrendingItem>>>;

pub struct Aggregator<B> {
    registry: SourceRegistry,
    translator: Translator<B>,
    fetch_retry: RetryPolicy,
    target_language: String,
    workers: usize,
    translate_concurrency: usize,
}

impl<B: TranslationBackend> Aggregator<B> {
    pub fn new(
        registry: SourceRegistry,
        translator: Translator<B>,
        fetch_retry: RetryPolicy,
        target_language: impl Into<String>,
        workers: usize,
        translate_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            translator,
            fetch_retry,
            target_language: target_language.into(),
            workers: workers.max(1),
            translate_concurrency: translate_concurrency.max(1),
        }
    }

    pub fn translator(&self) -> &Translator<B> {
        &self.translator
    }

    /// Run every source in `sources` for `run_date`, giving up on whatever is
    /// still outstanding after `deadline`.
    #[instrument(level = "info", skip_all, fields(%run_date, sources = sources.len(), workers = self.workers))]
    pub async fn run(&self, run_date: NaiveDate, sources: &[SourceConfig], deadline: Duration) -> RunResult {
        let deadline_at = Instant::now() + deadline;
        let configs: Vec<&SourceConfig> = sources.iter().unique_by(|s| s.id).collect();
        if configs.len() < sources.len() {
            warn!("Duplicate source entries in configuration; keeping the first of each");
        }

        let progress: Progress = Mutex::new(BTreeMap::new());
        let mut result = RunResult::new(run_date);
        let mut expired = false;

        {
            let mut pending = stream::iter(configs.iter().copied())
                .map(|config| self.run_source(config, run_date, &progress))
                .buffer_unordered(self.workers);

            loop {
                match tokio::time::timeout_at(deadline_at, pending.next()).await {
                    Ok(Some((id, run))) => {
                        result.per_source.insert(id, run);
                    }
                    Ok(None) => break,
                    Err(_) => {
                        expired = true;
                        break;
                    }
                }
            }
        }

        if expired {
            let mut snapshots = progress.into_inner().unwrap_or_else(|p| p.into_inner());
            let unfinished: Vec<SourceId> = configs
                .iter()
                .map(|c| c.id)
                .filter(|id| !result.per_source.contains_key(id))
                .collect();
            warn!(
                deadline_secs = deadline.as_secs(),
                unfinished = ?unfinished,
                "Run deadline expired; keeping completed work"
            );
            for id in unfinished {
                let err = SourceError::new(
                    id,
                    SourceErrorKind::Timeout,
                    format!("run deadline of {}s expired", deadline.as_secs()),
                );
                let run = match snapshots.remove(&id) {
                    Some(items) => SourceRun::partial(items, Some(err)),
                    None => SourceRun::failed(err),
                };
                result.per_source.insert(id, run);
            }
        }

        info!(
            status = ?result.status(),
            items = result.item_count(),
            "Aggregation finished"
        );
        result
    }

    #[instrument(level = "info", skip_all, fields(source = %config.id))]
    async fn run_source(
        &self,
        config: &SourceConfig,
        run_date: NaiveDate,
        progress: &Progress,
    ) -> (SourceId, SourceRun) {
        let id = config.id;
        let raw = match fetch_source(&self.registry, config, &self.fetch_retry).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(kind = ?e.kind, error = %e, "Source failed; continuing with the others");
                return (id, SourceRun::failed(e));
            }
        };

        let items = normalize_all(id, &raw, config.max_items, run_date);
        info!(fetched = raw.len(), kept = items.len(), "Normalized source");

        // Until each translation lands, the item counts as degraded.
        let snapshot = items
            .iter()
            .cloned()
            .map(|mut item| {
                item.translation_degraded = !item.description.trim().is_empty();
                item
            })
            .collect();
        lock(progress).insert(id, snapshot);

        let mut translated = stream::iter(items.into_iter().enumerate())
            .map(|(idx, item)| async move {
                (idx, self.translator.translate_item(item, &self.target_language).await)
            })
            .buffered(self.translate_concurrency);

        let mut out = Vec::new();
        while let Some((idx, item)) = translated.next().await {
            if let Some(slot) = lock(progress).get_mut(&id).and_then(|s| s.get_mut(idx)) {
                *slot = item.clone();
            }
            out.push(item);
        }

        let run = SourceRun::ok(out);
        info!(
            items = run.items.len(),
            degraded = run.degraded_count(),
            "Source complete"
        );
        (id, run)
    }
}

fn lock(progress: &Progress) -> std::sync::MutexGuard<'_, BTreeMap<SourceId, Vec<TrendingItem>>> {
    progress.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunStatus, SourceStatus};
    use crate::scrapers::testing::{FakeFetcher, hn_story};
    use crate::translate::TranslationCache;
    use crate::translate::testing::FakeBackend;
    use std::sync::Arc;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn aggregator(
        fetchers: Vec<FakeFetcher>,
        backend: Arc<FakeBackend>,
    ) -> Aggregator<Arc<FakeBackend>> {
        let mut registry = SourceRegistry::new();
        for f in fetchers {
            registry.register(Arc::new(f));
        }
        let translator = Translator::new(
            backend,
            Arc::new(TranslationCache::in_memory()),
            RetryPolicy::immediate(3),
        );
        Aggregator::new(registry, translator, RetryPolicy::immediate(2), "zh", 3, 4)
    }

    fn configs(ids: &[SourceId]) -> Vec<SourceConfig> {
        ids.iter().copied().map(SourceConfig::new).collect()
    }

    #[tokio::test]
    async fn test_one_failing_source_does_not_stop_the_others() {
        let agg = aggregator(
            vec![
                FakeFetcher::failing(SourceId::GitHub, SourceErrorKind::Parse),
                FakeFetcher::ok(
                    SourceId::HackerNews,
                    vec![hn_story(1, "A", Some("first")), hn_story(2, "B", None)],
                ),
            ],
            Arc::new(FakeBackend::default()),
        );

        let result = agg
            .run(
                date(),
                &configs(&[SourceId::GitHub, SourceId::HackerNews]),
                Duration::from_secs(10),
            )
            .await;

        assert_eq!(result.status(), RunStatus::Partial);
        let gh = &result.per_source[&SourceId::GitHub];
        assert_eq!(gh.status, SourceStatus::Failed);
        assert!(gh.items.is_empty());
        assert_eq!(gh.error.as_ref().unwrap().kind, SourceErrorKind::Parse);

        let hn = &result.per_source[&SourceId::HackerNews];
        assert_eq!(hn.status, SourceStatus::Ok);
        assert_eq!(hn.items.len(), 2);
        assert_eq!(hn.items[0].description_translated.as_deref(), Some("[zh] first"));
        assert!(!hn.items[1].translation_degraded);
    }

    #[tokio::test]
    async fn test_rank_follows_fetcher_order() {
        let agg = aggregator(
            vec![FakeFetcher::ok(
                SourceId::HackerNews,
                vec![
                    hn_story(30, "C", Some("c")),
                    hn_story(10, "A", Some("a")),
                    hn_story(20, "B", Some("b")),
                ],
            )],
            Arc::new(FakeBackend::default()),
        );
        let result = agg
            .run(date(), &configs(&[SourceId::HackerNews]), Duration::from_secs(10))
            .await;

        let items = &result.per_source[&SourceId::HackerNews].items;
        let got: Vec<_> = items.iter().map(|i| (i.rank, i.title.as_str())).collect();
        assert_eq!(got, vec![(1, "C"), (2, "A"), (3, "B")]);
    }

    #[tokio::test]
    async fn test_permanent_translation_failure_keeps_the_item() {
        let agg = aggregator(
            vec![FakeFetcher::ok(
                SourceId::HackerNews,
                vec![hn_story(1, "Foo", Some("foo text")), hn_story(2, "Bar", Some("bar text"))],
            )],
            Arc::new(FakeBackend::failing_permanently(&["bar text"])),
        );
        let result = agg
            .run(date(), &configs(&[SourceId::HackerNews]), Duration::from_secs(10))
            .await;

        let run = &result.per_source[&SourceId::HackerNews];
        assert_eq!(run.status, SourceStatus::Ok);
        assert_eq!(run.items.len(), 2);
        assert_eq!(run.items[1].description, "bar text");
        assert!(run.items[1].translation_degraded);
        assert_eq!(run.degraded_count(), 1);
        assert_eq!(result.status(), RunStatus::Ok);
    }

    #[tokio::test]
    async fn test_shared_text_across_sources_is_translated_once() {
        let backend = Arc::new(FakeBackend::default());
        let agg = aggregator(
            vec![
                FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", Some("same words"))]),
                FakeFetcher::ok(
                    SourceId::GitHub,
                    vec![crate::models::RawItem::GitHub(crate::models::GitHubRepo {
                        full_name: "a/b".to_string(),
                        url: "https://github.com/a/b".to_string(),
                        description: Some("same words".to_string()),
                        language: None,
                        stars: 1,
                        forks: 0,
                        stars_in_window: 0,
                        window: crate::models::TimeWindow::Daily,
                    })],
                ),
            ],
            backend.clone(),
        );
        agg.run(
            date(),
            &configs(&[SourceId::GitHub, SourceId::HackerNews]),
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_deadline_keeps_finished_work() {
        let backend = Arc::new(FakeBackend {
            delay: Duration::from_secs(30),
            ..FakeBackend::default()
        });
        let agg = aggregator(
            vec![
                // Fetched in time, translation never finishes.
                FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", Some("slow"))]),
                // Never fetched in time.
                FakeFetcher::ok(SourceId::GitHub, vec![]).with_delay(Duration::from_secs(30)),
            ],
            backend,
        );

        let result = agg
            .run(
                date(),
                &configs(&[SourceId::GitHub, SourceId::HackerNews]),
                Duration::from_millis(200),
            )
            .await;

        let hn = &result.per_source[&SourceId::HackerNews];
        assert_eq!(hn.status, SourceStatus::Partial);
        assert_eq!(hn.items.len(), 1);
        assert!(hn.items[0].translation_degraded);
        assert_eq!(hn.error.as_ref().unwrap().kind, SourceErrorKind::Timeout);

        let gh = &result.per_source[&SourceId::GitHub];
        assert_eq!(gh.status, SourceStatus::Failed);
        assert_eq!(gh.error.as_ref().unwrap().kind, SourceErrorKind::Timeout);

        assert_eq!(result.status(), RunStatus::Partial);
    }

    #[tokio::test]
    async fn test_no_sources_is_a_failed_run() {
        let agg = aggregator(vec![], Arc::new(FakeBackend::default()));
        let result = agg.run(date(), &[], Duration::from_secs(1)).await;
        assert_eq!(result.status(), RunStatus::Failed);
    }
}
