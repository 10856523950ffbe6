//! Machine-readable run records, read back by the `status` command.
//!
//! ```text
//! output_dir/data/
//! ├── last_run.json
//! └── runs/
//!     └── 2024-01-01.json
//! ```
//!
//! Unlike the published documents these carry a wall-clock `finished_at`, so
//! they are kept out of the pages readers see.

use crate::error::{PublishError, SourceError};
use crate::models::{RunResult, RunStatus, SourceId, SourceStatus};
use crate::utils::write_atomic;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub status: SourceStatus,
    pub items: usize,
    pub untranslated: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_date: NaiveDate,
    pub status: RunStatus,
    pub exit_code: u8,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub sources: BTreeMap<SourceId, SourceSummary>,
    pub documents: Vec<PathBuf>,
    pub publish_errors: Vec<PublishError>,
}

impl RunRecord {
    pub fn summarize(result: &RunResult) -> BTreeMap<SourceId, SourceSummary> {
        result
            .per_source
            .iter()
            .map(|(id, run)| {
                (
                    *id,
                    SourceSummary {
                        status: run.status,
                        items: run.items.len(),
                        untranslated: run.degraded_count(),
                        error: run.error.as_ref().map(SourceError::to_string),
                    },
                )
            })
            .collect()
    }
}

fn runs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("runs")
}

pub fn last_run_path(data_dir: &Path) -> PathBuf {
    data_dir.join("last_run.json")
}

/// Write `record` as `runs/<date>.json` and `last_run.json`.
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.display(), date = %record.run_date))]
pub fn write_run_record(record: &RunRecord, data_dir: &Path) -> Result<(), PublishError> {
    let dated = runs_dir(data_dir).join(format!("{}.json", record.run_date.format("%Y-%m-%d")));
    let json = serde_json::to_vec_pretty(record).map_err(|e| PublishError::render(&dated, e))?;
    write_atomic(&dated, &json).map_err(|e| PublishError::io(&dated, &e))?;

    let last = last_run_path(data_dir);
    write_atomic(&last, &json).map_err(|e| PublishError::io(&last, &e))?;
    info!(path = %dated.display(), "Wrote run record");
    Ok(())
}

/// The most recent run record, or `None` before the first run.
pub fn read_last_run(data_dir: &Path) -> Result<Option<RunRecord>, PublishError> {
    let path = last_run_path(data_dir);
    match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PublishError::render(&path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PublishError::io(&path, &e)),
    }
}
