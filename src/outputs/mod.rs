//! Publishing of a [`RunResult`] as Markdown documents.
//!
//! # Submodules
//!
//! - [`markdown`]: dated per-source documents and the "today" page
//! - [`indexes`]: the history index (`data/history.json` + `history.md`)
//! - [`json`]: run records read back by the `status` command
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── index.md                          # today, replaced every run
//! ├── history.md                        # every run date
//! ├── github-trending-2024-01-01.md     # one per source per date
//! ├── producthunt-2024-01-01.md
//! ├── hackernews-2024-01-01.md
//! └── data/
//!     ├── history.json
//!     ├── translation_cache.json
//!     ├── last_run.json
//!     └── runs/2024-01-01.json
//! ```
//!
//! Every file is written through [`write_atomic`], so readers see either the
//! previous or the new version of a document, never a mix. A failed write is
//! recorded in [`PublishedDocumentSet::errors`] and publishing continues with
//! the remaining documents.

use crate::error::PublishError;
use crate::models::{RunResult, SourceId};
use crate::utils::write_atomic;
use chrono::NaiveDate;
use indexes::HistoryIndex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

pub mod indexes;
pub mod json;
pub mod markdown;

/// What one `publish` call wrote, and what it failed to write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedDocumentSet {
    pub dated: BTreeMap<SourceId, PathBuf>,
    pub today: Option<PathBuf>,
    pub history: Option<PathBuf>,
    pub errors: Vec<PublishError>,
}

impl PublishedDocumentSet {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.dated
            .values()
            .chain(self.today.iter())
            .chain(self.history.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dated.is_empty() && self.today.is_none() && self.history.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Publisher {
    output_dir: PathBuf,
    today_top_n: usize,
    target_language: String,
}

impl Publisher {
    pub fn new(output_dir: impl Into<PathBuf>, today_top_n: usize, target_language: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            today_top_n,
            target_language: target_language.into(),
        }
    }

    pub fn today_path(&self) -> PathBuf {
        self.output_dir.join("index.md")
    }

    pub fn history_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.output_dir.join("data").join("history.json"),
            self.output_dir.join("history.md"),
        )
    }

    /// Write the dated documents, the today page and the history index.
    ///
    /// A run with nothing publishable writes nothing, so the previous
    /// today page and history stay as they were.
    #[instrument(level = "info", skip_all, fields(date = %result.run_date, out = %self.output_dir.display()))]
    pub fn publish(&self, result: &RunResult) -> PublishedDocumentSet {
        let mut set = PublishedDocumentSet::default();

        if result.publishable().next().is_none() {
            warn!("Nothing to publish for this run");
            return set;
        }

        for (id, run) in result.publishable() {
            let path = self
                .output_dir
                .join(markdown::dated_file_name(id, result.run_date));
            match markdown::render_dated(id, run, result.run_date, &self.target_language) {
                Ok(doc) => match commit(&path, &doc) {
                    Ok(()) => {
                        info!(source = %id, path = %path.display(), items = run.items.len(), "Wrote dated document");
                        set.dated.insert(id, path);
                    }
                    Err(e) => record(&mut set, e),
                },
                Err(e) => record(&mut set, PublishError::render(&path, e)),
            }
        }

        let written: Vec<(SourceId, String)> = set
            .dated
            .iter()
            .map(|(id, _)| (*id, markdown::dated_file_name(*id, result.run_date)))
            .collect();

        let today = self.today_path();
        match markdown::render_today(result, self.today_top_n, &written) {
            Ok(doc) => match commit(&today, &doc) {
                Ok(()) => set.today = Some(today),
                Err(e) => record(&mut set, e),
            },
            Err(e) => record(&mut set, PublishError::render(&today, e)),
        }

        if !set.dated.is_empty() {
            match self.update_history(result.run_date, set.dated.keys().copied()) {
                Ok(path) => set.history = Some(path),
                Err(e) => record(&mut set, e),
            }
        }

        info!(
            documents = set.paths().len(),
            errors = set.errors.len(),
            "Publish finished"
        );
        set
    }

    fn update_history(
        &self,
        date: NaiveDate,
        sources: impl IntoIterator<Item = SourceId>,
    ) -> Result<PathBuf, PublishError> {
        let (json_path, md_path) = self.history_paths();
        let mut history = HistoryIndex::load(&json_path)?;
        let rerun = history.contains(date);
        history.record(date, sources);
        history.save(&json_path, &md_path)?;
        info!(%date, rerun, entries = history.len(), "Recorded run date in history");
        Ok(md_path)
    }
}

fn commit(path: &Path, doc: &str) -> Result<(), PublishError> {
    write_atomic(path, doc.as_bytes()).map_err(|e| PublishError::io(path, &e))
}

fn record(set: &mut PublishedDocumentSet, e: PublishError) {
    error!(path = e.path(), error = %e, "Document not published");
    set.errors.push(e);
}
