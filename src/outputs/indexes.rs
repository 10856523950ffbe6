//! History index: every run date with links to its per-source documents.
//!
//! The machine-readable list lives in `data/history.json`; `history.md` is
//! re-rendered from it on every publish.
//!
//! # Invariants
//!
//! - Entries are in chronological order.
//! - A date appears at most once. Re-publishing a date merges its source
//!   list instead of adding a second entry.
//!
//! ```text
//! # History
//!
//! ## 2024-01
//!
//! - **2024-01-01**: [GitHub Trending](./github-trending-2024-01-01.md) · [Hacker News](./hackernews-2024-01-01.md)
//! ```

use super::markdown::dated_file_name;
use crate::error::PublishError;
use crate::models::SourceId;
use crate::utils::write_atomic;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub sources: BTreeSet<SourceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryIndex {
    pub runs: Vec<HistoryEntry>,
}

impl HistoryIndex {
    /// Read `path`; a missing file is an empty history.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, PublishError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history yet");
                return Ok(Self::default());
            }
            Err(e) => return Err(PublishError::io(path, &e)),
        };
        let mut index: Self =
            serde_json::from_str(&text).map_err(|e| PublishError::render(path, e))?;
        index.normalize();
        Ok(index)
    }

    /// Sort by date and fold duplicate dates together.
    fn normalize(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        self.runs = runs
            .into_iter()
            .sorted_by_key(|e| e.date)
            .coalesce(|mut a, b| {
                if a.date == b.date {
                    a.sources.extend(b.sources);
                    Ok(a)
                } else {
                    Err((a, b))
                }
            })
            .collect();
    }

    /// Record that `sources` were published for `date`.
    ///
    /// Returns `true` when `date` was not in the history before.
    pub fn record(&mut self, date: NaiveDate, sources: impl IntoIterator<Item = SourceId>) -> bool {
        match self.runs.binary_search_by_key(&date, |e| e.date) {
            Ok(pos) => {
                self.runs[pos].sources.extend(sources);
                false
            }
            Err(pos) => {
                self.runs.insert(
                    pos,
                    HistoryEntry {
                        date,
                        sources: sources.into_iter().collect(),
                    },
                );
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.runs.binary_search_by_key(&date, |e| e.date).is_ok()
    }

    pub fn render_markdown(&self) -> String {
        let mut lines = vec!["# History".to_string(), String::new()];
        for (month, entries) in &self.runs.iter().chunk_by(|e| e.date.format("%Y-%m").to_string()) {
            lines.push(format!("## {month}"));
            lines.push(String::new());
            for entry in entries {
                let links = entry
                    .sources
                    .iter()
                    .map(|id| format!("[{}](./{})", id.display_name(), dated_file_name(*id, entry.date)))
                    .join(" · ");
                lines.push(format!("- **{}**: {}", entry.date, links));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Write the JSON index and the rendered Markdown page.
    #[instrument(level = "info", skip_all, fields(entries = self.runs.len()))]
    pub fn save(&self, json_path: &Path, markdown_path: &Path) -> Result<(), PublishError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| PublishError::render(json_path, e))?;
        write_atomic(json_path, &json).map_err(|e| PublishError::io(json_path, &e))?;
        write_atomic(markdown_path, self.render_markdown().as_bytes())
            .map_err(|e| PublishError::io(markdown_path, &e))?;
        info!(path = %markdown_path.display(), "Updated history index");
        Ok(())
    }
}
