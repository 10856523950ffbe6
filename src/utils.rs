//! Helpers for string handling, number formatting and file system writes.
//!
//! - Char-safe truncation for logs and previews
//! - Compact counts (`1.2K`) and tolerant count parsing (`"1,234"`, `"3.4k"`)
//! - All-or-nothing file writes
//! - Output directory validation

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::io::Write as _;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and byte count appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Keep the first `max_chars` characters, appending `...` when something was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format a count the way listing pages do: `999`, `1.2K`, `3.4M`.
pub fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*([km])?").expect("valid count regex"));

/// Parse the first count in a piece of text: `"1,234"`, `"3.4k stars today"`.
///
/// Returns 0 when no number is present.
pub fn parse_count(text: &str) -> u64 {
    let Some(caps) = COUNT_RE.captures(text) else {
        return 0;
    };
    let digits = caps[1].replace(',', "");
    let value: f64 = digits.parse().unwrap_or(0.0);
    let scale = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(s) if s == "k" => 1_000.0,
        Some(s) if s == "m" => 1_000_000.0,
        _ => 1.0,
    };
    (value * scale).round() as u64
}

/// Write `contents` to `path` so readers never observe a partial file.
///
/// The bytes go to a sibling temporary file first, are synced, and are then
/// renamed over the destination.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    stdfs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let tmp_path = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    let result = (|| {
        let mut tmp = stdfs::File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
        stdfs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = stdfs::remove_file(&tmp_path);
    }
    result
}

/// Ensure a directory exists and is writable.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
