//! Markdown rendering for the dated and "today" documents.
//!
//! Rendering is a pure function of the [`RunResult`] and the run date: no
//! clocks, no hash-map iteration order, so the same input always produces the
//! same bytes.

use crate::models::{RunResult, SourceId, SourceRun, SourceStatus, TrendingItem};
use crate::utils::truncate_chars;
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;

/// Characters of description shown per item on the "today" page.
pub const TODAY_DESCRIPTION_CHARS: usize = 200;

/// Languages listed in a dated document's statistics table.
const TOP_LANGUAGES: usize = 3;

const UNAVAILABLE_MARKER: &str = "_Translation unavailable; showing the original text._";

#[derive(Debug, Serialize)]
struct FrontMatter<'a> {
    title: String,
    description: String,
    date: String,
    tags: Vec<&'a str>,
}

fn front_matter(fm: &FrontMatter<'_>) -> Result<String, serde_yaml::Error> {
    Ok(format!("---\n{}---\n", serde_yaml::to_string(fm)?))
}

/// File name of a source's document for `date`, e.g. `github-trending-2024-01-01.md`.
pub fn dated_file_name(source_id: SourceId, date: NaiveDate) -> String {
    format!("{}-{}.md", source_id.document_slug(), date.format("%Y-%m-%d"))
}

fn quote(text: &str) -> String {
    text.lines()
        .map(|l| format!("> {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn item_section(item: &TrendingItem, target_lang: &str) -> Vec<String> {
    let mut lines = vec![
        format!("## {}. {}", item.rank, item.title),
        String::new(),
        format!("- **Link**: <{}>", item.url),
    ];
    if !item.metric_summary.is_empty() {
        lines.push(format!("- **Stats**: {}", item.metric_summary));
    }
    lines.push(String::new());

    if item.description.trim().is_empty() {
        lines.push("_No description._".to_string());
    } else {
        lines.push("**Original**:".to_string());
        lines.push(String::new());
        lines.push(quote(&item.description));
        lines.push(String::new());
        lines.push(format!("**Translation ({target_lang})**:"));
        lines.push(String::new());
        match (&item.description_translated, item.translation_degraded) {
            (Some(t), false) => lines.push(quote(t)),
            _ => lines.push(quote(UNAVAILABLE_MARKER)),
        }
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());
    lines
}

/// Most frequent languages first, ties broken by name.
fn top_languages(items: &[TrendingItem]) -> Vec<(&str, usize)> {
    items
        .iter()
        .filter_map(|i| i.language.as_deref())
        .counts()
        .into_iter()
        .sorted_by(|(a, x), (b, y)| y.cmp(x).then_with(|| a.cmp(b)))
        .take(TOP_LANGUAGES)
        .collect()
}

fn status_label(status: SourceStatus) -> &'static str {
    match status {
        SourceStatus::Ok => "ok",
        SourceStatus::Partial => "partial",
        SourceStatus::Failed => "unavailable",
    }
}

/// The full ranked list of one source for one day.
pub fn render_dated(
    source_id: SourceId,
    run: &SourceRun,
    run_date: NaiveDate,
    target_lang: &str,
) -> Result<String, serde_yaml::Error> {
    let date = run_date.format("%Y-%m-%d").to_string();
    let year = run_date.format("%Y").to_string();
    let mut out = front_matter(&FrontMatter {
        title: format!("{} · {}", source_id.display_name(), date),
        description: format!("{} listings for {}", source_id.display_name(), date),
        date: date.clone(),
        tags: vec![source_id.as_str(), "trending", year.as_str()],
    })?;

    let mut lines = vec![
        String::new(),
        format!("# {} · {}", source_id.display_name(), date),
        String::new(),
        format!("Source: <{}>", source_id.homepage()),
        String::new(),
    ];
    if run.status == SourceStatus::Partial {
        let reason = run
            .error
            .as_ref()
            .map(|e| e.message.as_str())
            .unwrap_or("the run did not complete");
        lines.push(format!("> **Note**: this list is incomplete ({reason})."));
        lines.push(String::new());
    }
    for item in &run.items {
        lines.extend(item_section(item, target_lang));
    }

    lines.extend([
        "## Statistics".to_string(),
        String::new(),
        "| Metric | Value |".to_string(),
        "|--------|-------|".to_string(),
        format!("| Items | {} |", run.items.len()),
        format!("| Untranslated | {} |", run.degraded_count()),
    ]);
    let languages = top_languages(&run.items);
    if !languages.is_empty() {
        lines.push(format!(
            "| Top languages | {} |",
            languages
                .iter()
                .map(|(lang, n)| format!("{lang} ({n})"))
                .join(", ")
        ));
    }
    lines.extend([
        String::new(),
        "[All dates](history.md)".to_string(),
        String::new(),
    ]);

    out.push_str(&lines.join("\n"));
    Ok(out)
}

/// Cross-source summary for `result.run_date`: top `top_n` items per source.
///
/// `dated` names the dated documents that were written, so the page only
/// links to files that exist.
pub fn render_today(
    result: &RunResult,
    top_n: usize,
    dated: &[(SourceId, String)],
) -> Result<String, serde_yaml::Error> {
    let date = result.run_date.format("%Y-%m-%d").to_string();
    let mut out = front_matter(&FrontMatter {
        title: "Trending today".to_string(),
        description: format!("Top listings for {date}"),
        date: date.clone(),
        tags: vec!["trending", "today"],
    })?;

    let mut lines = vec![
        String::new(),
        format!("# Trending · {date}"),
        String::new(),
        "| Source | Items | Status |".to_string(),
        "|--------|-------|--------|".to_string(),
    ];
    for (id, run) in &result.per_source {
        lines.push(format!(
            "| {} | {} | {} |",
            id.display_name(),
            run.items.len(),
            status_label(run.status)
        ));
    }
    lines.push(String::new());

    for (id, run) in &result.per_source {
        lines.push(format!("## {}", id.display_name()));
        lines.push(String::new());

        let file = dated.iter().find(|(d, _)| d == id).map(|(_, f)| f);
        match file {
            Some(file) if !run.items.is_empty() => {
                for item in run.items.iter().take(top_n) {
                    let mut line = format!("{}. **[{}]({})**", item.rank, item.title, item.url);
                    if !item.metric_summary.is_empty() {
                        line.push_str(&format!(" · {}", item.metric_summary));
                    }
                    lines.push(line);
                    let desc = item.display_description();
                    if !desc.trim().is_empty() {
                        lines.push(format!(
                            "   {}",
                            truncate_chars(desc, TODAY_DESCRIPTION_CHARS)
                        ));
                    }
                }
                lines.push(String::new());
                lines.push(format!(
                    "[Full list ({} items)](./{})",
                    run.items.len(),
                    file
                ));
            }
            _ => lines.push("_Unavailable for this run._".to_string()),
        }
        lines.push(String::new());
    }

    lines.push("[All dates](history.md)".to_string());
    lines.push(String::new());
    out.push_str(&lines.join("\n"));
    Ok(out)
}
