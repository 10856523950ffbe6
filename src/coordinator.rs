//! End-to-end execution: aggregate, publish, persist, decide the verdict.
//!
//! [`RunCoordinator::execute_once`] owns the run deadline (enforced by the
//! [`Aggregator`]), publishes whatever was collected, flushes the translation
//! cache and writes the run record that `status` reads back.
//!
//! Exit codes:
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | every source OK, every document written, every description translated |
//! | 2 | published with warnings: a source failed or was cut short, a document failed, or translations degraded |
//! | 1 | nothing published: every source failed (or no document could be written) |

use crate::aggregator::Aggregator;
use crate::config::PipelineConfig;
use crate::error::PublishError;
use crate::models::{RunResult, RunStatus, SourceStatus};
use crate::outputs::json::{RunRecord, read_last_run, write_run_record};
use crate::outputs::{PublishedDocumentSet, Publisher};
use crate::scrapers::SourceRegistry;
use crate::translate::deepseek::DeepSeekBackend;
use crate::translate::{TranslationBackend, TranslationCache, Translator};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use itertools::Itertools;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Warnings,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Warnings => 2,
        }
    }

    /// Verdict for a run that produced `result` and published `published`.
    pub fn from_outcome(result: &RunResult, published: &PublishedDocumentSet) -> Self {
        if result.status() == RunStatus::Failed || published.dated.is_empty() {
            return Self::Failure;
        }
        let degraded = result
            .per_source
            .values()
            .any(|r| r.status == SourceStatus::Ok && r.degraded_count() > 0);
        if result.status() == RunStatus::Partial || !published.errors.is_empty() || degraded {
            Self::Warnings
        } else {
            Self::Success
        }
    }
}

/// Everything one execution produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: RunResult,
    pub published: PublishedDocumentSet,
    pub exit: ExitStatus,
    pub elapsed: Duration,
}

impl RunReport {
    /// Overall status, counting failed documents as well as failed sources.
    pub fn status(&self) -> RunStatus {
        match self.result.status() {
            RunStatus::Failed => RunStatus::Failed,
            _ if self.published.dated.is_empty() => RunStatus::Failed,
            _ if !self.published.errors.is_empty() => RunStatus::Partial,
            status => status,
        }
    }

    pub fn record(&self) -> RunRecord {
        RunRecord {
            run_date: self.result.run_date,
            status: self.status(),
            exit_code: self.exit.code(),
            finished_at: Utc::now(),
            elapsed_ms: self.elapsed.as_millis() as u64,
            sources: RunRecord::summarize(&self.result),
            documents: self.published.paths(),
            publish_errors: self.published.errors.clone(),
        }
    }
}

pub struct RunCoordinator<B> {
    config: PipelineConfig,
    aggregator: Aggregator<B>,
    publisher: Publisher,
}

impl RunCoordinator<DeepSeekBackend> {
    /// Wire up the real fetchers, the DeepSeek backend and the on-disk cache.
    pub fn from_config(config: PipelineConfig) -> Result<Self, Box<dyn Error>> {
        let registry = SourceRegistry::with_defaults()?;
        let backend = DeepSeekBackend::new(&config.translator)?;
        let cache = Arc::new(TranslationCache::load(&config.cache_path())?);
        Ok(Self::new(config, registry, backend, cache))
    }
}

impl<B: TranslationBackend> RunCoordinator<B> {
    pub fn new(
        config: PipelineConfig,
        registry: SourceRegistry,
        backend: B,
        cache: Arc<TranslationCache>,
    ) -> Self {
        debug!(fetchers = %registry.ids().join(","), "Registered fetchers");
        let translator = Translator::new(backend, cache, config.translate_retry);
        let aggregator = Aggregator::new(
            registry,
            translator,
            config.fetch_retry,
            config.target_language.clone(),
            config.workers(),
            config.translate_concurrency,
        );
        let publisher = Publisher::new(
            config.output_dir.clone(),
            config.today_top_n,
            config.target_language.clone(),
        );
        Self {
            config,
            aggregator,
            publisher,
        }
    }

    /// One full run for `run_date`.
    #[instrument(level = "info", skip_all, fields(%run_date))]
    pub async fn execute_once(&self, run_date: NaiveDate) -> RunReport {
        let t0 = Instant::now();
        let sources = self.config.enabled_sources();
        info!(sources = sources.len(), deadline_secs = self.config.run_deadline_secs, "Run starting");

        let result = self
            .aggregator
            .run(run_date, &sources, self.config.run_deadline())
            .await;
        let published = self.publisher.publish(&result);

        if let Err(e) = self.aggregator.translator().cache().flush() {
            error!(error = %e, "Failed to flush translation cache");
        }

        let report = RunReport {
            exit: ExitStatus::from_outcome(&result, &published),
            result,
            published,
            elapsed: t0.elapsed(),
        };

        if let Err(e) = write_run_record(&report.record(), &self.config.data_dir()) {
            error!(error = %e, "Failed to write run record");
        }

        let elapsed = report.elapsed;
        match report.exit {
            ExitStatus::Success => info!(?elapsed, documents = report.published.paths().len(), "Run complete"),
            ExitStatus::Warnings => warn!(
                ?elapsed,
                documents = report.published.paths().len(),
                publish_errors = report.published.errors.len(),
                "Run complete with warnings"
            ),
            ExitStatus::Failure if report.published.is_empty() => {
                error!(?elapsed, "Run failed; nothing published")
            }
            ExitStatus::Failure => error!(
                ?elapsed,
                publish_errors = report.published.errors.len(),
                "Run failed; no dated document written"
            ),
        }
        report
    }

    /// Run every day at `at` (local time) until Ctrl-C.
    pub async fn schedule(&self, at: NaiveTime, run_now: bool) {
        self.schedule_until(at, run_now, tokio::signal::ctrl_c()).await;
    }

    /// Run every day at `at` until `shutdown` resolves.
    ///
    /// `shutdown` is raced against the waits and the runs alike. A run cut
    /// short publishes nothing further, but the translations it already paid
    /// for are flushed to the cache.
    pub async fn schedule_until<F: Future>(&self, at: NaiveTime, run_now: bool, shutdown: F) {
        info!(at = %at.format("%H:%M"), run_now, "Scheduler started");
        tokio::pin!(shutdown);
        let mut pending = run_now.then(|| Local::now().date_naive());

        loop {
            let run_date = match pending.take() {
                Some(date) => date,
                None => {
                    let now = Local::now().naive_local();
                    let next = next_run_after(now, at);
                    let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                    info!(next = %next.format("%Y-%m-%d %H:%M"), wait_secs = wait.as_secs(), "Waiting for next run");
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => next.date(),
                        _ = &mut shutdown => {
                            info!("Interrupted; scheduler stopping");
                            return;
                        }
                    }
                }
            };

            tokio::select! {
                report = self.execute_once(run_date) => {
                    info!(exit_code = report.exit.code(), "Scheduled run finished");
                }
                _ = &mut shutdown => {
                    warn!(%run_date, "Interrupted during a run; scheduler stopping");
                    if let Err(e) = self.aggregator.translator().cache().flush() {
                        error!(error = %e, "Failed to flush translation cache");
                    }
                    return;
                }
            }
        }
    }
}

/// The first `at` strictly after `now`.
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Load the last run record for `status`.
pub fn last_run(config: &PipelineConfig) -> Result<Option<RunRecord>, PublishError> {
    read_last_run(&config.data_dir())
}

/// Human-readable summary of a run record.
pub fn render_status(record: &RunRecord) -> String {
    let mut lines = vec![
        format!(
            "Last run: {} ({:?}, exit code {})",
            record.run_date, record.status, record.exit_code
        ),
        format!(
            "Finished: {} in {:.1}s",
            record.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
            record.elapsed_ms as f64 / 1000.0
        ),
    ];
    for (id, s) in &record.sources {
        let mut line = format!(
            "  {:<12} {:?}: {} items, {} untranslated",
            id.as_str(),
            s.status,
            s.items,
            s.untranslated
        );
        if let Some(err) = &s.error {
            line.push_str(&format!(" [{err}]"));
        }
        lines.push(line);
    }
    for doc in &record.documents {
        lines.push(format!("  wrote {}", doc.display()));
    }
    for e in &record.publish_errors {
        lines.push(format!("  error: {e}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;
    use crate::models::{ProductHuntPost, RawItem, SourceId};
    use crate::outputs::indexes::HistoryIndex;
    use crate::retry::RetryPolicy;
    use crate::scrapers::testing::{FakeFetcher, hn_story};
    use crate::translate::testing::FakeBackend;
    use tempfile::TempDir;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn config(dir: &TempDir, ids: &[SourceId]) -> PipelineConfig {
        PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            sources: ids.iter().copied().map(crate::config::SourceConfig::new).collect(),
            fetch_retry: RetryPolicy::immediate(0),
            translate_retry: RetryPolicy::immediate(3),
            ..PipelineConfig::default()
        }
    }

    fn coordinator(
        config: PipelineConfig,
        fetchers: Vec<FakeFetcher>,
        backend: Arc<FakeBackend>,
    ) -> RunCoordinator<Arc<FakeBackend>> {
        let mut registry = SourceRegistry::new();
        for f in fetchers {
            registry.register(Arc::new(f));
        }
        let cache = Arc::new(TranslationCache::load(&config.cache_path()).unwrap());
        RunCoordinator::new(config, registry, backend, cache)
    }

    fn post(id: &str, name: &str, tagline: &str) -> RawItem {
        RawItem::ProductHunt(ProductHuntPost {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("https://www.producthunt.com/products/{id}"),
            tagline: Some(tagline.to_string()),
        })
    }

    #[test]
    fn test_next_run_after() {
        let at = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        let early = date().and_hms_opt(4, 59, 0).unwrap();
        let late = date().and_hms_opt(5, 0, 0).unwrap();
        assert_eq!(next_run_after(early, at), date().and_time(at));
        assert_eq!(
            next_run_after(late, at),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_time(at)
        );
    }

    #[tokio::test]
    async fn test_all_ok_run_succeeds_and_records_status() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::HackerNews]),
            vec![FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", Some("hello"))])],
            Arc::new(FakeBackend::default()),
        );
        let report = c.execute_once(date()).await;
        assert_eq!(report.exit, ExitStatus::Success);
        assert_eq!(report.exit.code(), 0);

        let record = last_run(&c.config).unwrap().unwrap();
        assert_eq!(record.run_date, date());
        assert_eq!(record.status, RunStatus::Ok);
        assert_eq!(record.sources[&SourceId::HackerNews].items, 1);
        assert!(render_status(&record).contains("hackernews"));
    }

    #[tokio::test]
    async fn test_one_failed_source_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::GitHub, SourceId::HackerNews]),
            vec![
                FakeFetcher::failing(SourceId::GitHub, SourceErrorKind::Network),
                FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", None)]),
            ],
            Arc::new(FakeBackend::default()),
        );
        let report = c.execute_once(date()).await;
        assert_eq!(report.exit, ExitStatus::Warnings);
        assert_eq!(report.exit.code(), 2);
        assert!(dir.path().join("hackernews-2024-01-01.md").exists());
        assert!(!dir.path().join("github-trending-2024-01-01.md").exists());
    }

    #[tokio::test]
    async fn test_every_source_failing_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::GitHub, SourceId::ProductHunt]),
            vec![
                FakeFetcher::failing(SourceId::GitHub, SourceErrorKind::Parse),
                FakeFetcher::failing(SourceId::ProductHunt, SourceErrorKind::RateLimit),
            ],
            Arc::new(FakeBackend::default()),
        );
        let report = c.execute_once(date()).await;
        assert_eq!(report.exit, ExitStatus::Failure);
        assert_eq!(report.exit.code(), 1);
        assert!(!dir.path().join("index.md").exists());
        assert_eq!(last_run(&c.config).unwrap().unwrap().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_translation_is_published_with_original_text() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::ProductHunt]),
            vec![FakeFetcher::ok(
                SourceId::ProductHunt,
                vec![post("x", "Foo", "Foo does things"), post("y", "Bar", "Bar does things")],
            )],
            Arc::new(FakeBackend::failing_permanently(&["Bar does things"])),
        );
        let report = c.execute_once(date()).await;
        assert_eq!(report.exit, ExitStatus::Warnings);

        let items = &report.result.per_source[&SourceId::ProductHunt].items;
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].rank, items[0].title.as_str()), (1, "Foo"));
        assert_eq!((items[1].rank, items[1].title.as_str()), (2, "Bar"));
        assert!(!items[0].translation_degraded);
        assert!(items[1].translation_degraded);

        let doc = std::fs::read_to_string(dir.path().join("producthunt-2024-01-01.md")).unwrap();
        let bar = doc.find("## 2. Bar").unwrap();
        assert!(doc[bar..].contains("> Bar does things"));
        assert!(doc[bar..].contains("Translation unavailable"));

        c.execute_once(date()).await;
        let history = HistoryIndex::load(&dir.path().join("data").join("history.json")).unwrap();
        assert_eq!(history.runs.iter().filter(|e| e.date == date()).count(), 1);
    }

    #[tokio::test]
    async fn test_cache_is_flushed_and_reused_across_runs() {
        let dir = TempDir::new().unwrap();
        let first = Arc::new(FakeBackend::default());
        let c = coordinator(
            config(&dir, &[SourceId::HackerNews]),
            vec![FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", Some("hello"))])],
            first.clone(),
        );
        c.execute_once(date()).await;
        assert_eq!(first.calls(), 1);
        assert!(c.config.cache_path().exists());

        // A fresh process: new coordinator, cache loaded from disk.
        let second = Arc::new(FakeBackend::default());
        let c2 = coordinator(
            config(&dir, &[SourceId::HackerNews]),
            vec![FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", Some("hello"))])],
            second.clone(),
        );
        let report = c2.execute_once(date()).await;
        assert_eq!(second.calls(), 0);
        assert_eq!(report.exit, ExitStatus::Success);
    }

    #[tokio::test]
    async fn test_publish_error_is_recorded_as_partial() {
        let dir = TempDir::new().unwrap();
        // A directory in place of the dated document makes its write fail.
        std::fs::create_dir_all(dir.path().join("github-trending-2024-01-01.md").join("blocker")).unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::GitHub, SourceId::HackerNews]),
            vec![
                FakeFetcher::ok(
                    SourceId::GitHub,
                    vec![RawItem::GitHub(crate::models::GitHubRepo {
                        full_name: "a/b".to_string(),
                        url: "https://github.com/a/b".to_string(),
                        description: Some("repo".to_string()),
                        language: Some("Rust".to_string()),
                        stars: 1,
                        forks: 0,
                        stars_in_window: 0,
                        window: crate::models::TimeWindow::Daily,
                    })],
                ),
                FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", Some("hello"))]),
            ],
            Arc::new(FakeBackend::default()),
        );
        let report = c.execute_once(date()).await;
        assert_eq!(report.result.status(), RunStatus::Ok);
        assert_eq!(report.published.errors.len(), 1);
        assert_eq!(report.exit, ExitStatus::Warnings);
        assert_eq!(report.status(), RunStatus::Partial);

        let record = last_run(&c.config).unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Partial);
        assert_eq!(record.exit_code, 2);
        assert!(render_status(&record).contains("(Partial, exit code 2)"));
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_skips_the_run() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::HackerNews]),
            vec![FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", None)])],
            Arc::new(FakeBackend::default()),
        );
        let at = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        tokio::time::timeout(Duration::from_secs(5), c.schedule_until(at, false, std::future::ready(())))
            .await
            .unwrap();
        assert!(last_run(&c.config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_during_a_run_stops_the_scheduler() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(
            config(&dir, &[SourceId::HackerNews]),
            vec![FakeFetcher::ok(SourceId::HackerNews, vec![hn_story(1, "A", None)])
                .with_delay(Duration::from_secs(30))],
            Arc::new(FakeBackend::default()),
        );
        let at = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        tokio::time::timeout(Duration::from_secs(5), c.schedule_until(at, true, shutdown))
            .await
            .unwrap();
        assert!(!dir.path().join("index.md").exists());
        assert!(last_run(&c.config).unwrap().is_none());
    }
}
