//! Mapping from source-specific [`RawItem`]s to canonical [`TrendingItem`]s.
//!
//! Pure and deterministic: no I/O, no clock. The fetcher's order is
//! authoritative and is never re-sorted here.

use crate::models::{RawItem, SourceId, TrendingItem};
use crate::utils::{collapse_whitespace, format_count};
use chrono::NaiveDate;
use itertools::Itertools;

/// Map one raw listing. `rank` is its 1-based position in the prepared list.
pub fn normalize(source_id: SourceId, raw: &RawItem, rank: usize, run_date: NaiveDate) -> TrendingItem {
    let (external_id, title, description, url, metric_summary, language) = match raw {
        RawItem::GitHub(repo) => {
            let mut metric = format!(
                "★ {} · {} forks",
                format_count(repo.stars),
                format_count(repo.forks)
            );
            if repo.stars_in_window > 0 {
                metric.push_str(&format!(
                    " · {} stars {}",
                    format_count(repo.stars_in_window),
                    repo.window.phrase()
                ));
            }
            if let Some(lang) = &repo.language {
                metric.push_str(&format!(" · {lang}"));
            }
            (
                repo.full_name.clone(),
                repo.full_name.clone(),
                repo.description.clone(),
                repo.url.clone(),
                metric,
                repo.language.clone(),
            )
        }
        RawItem::ProductHunt(post) => (
            post.id.clone(),
            post.name.clone(),
            post.tagline.clone(),
            post.url.clone(),
            String::new(),
            None,
        ),
        RawItem::HackerNews(story) => (
            story.id.to_string(),
            story.title.clone(),
            story.text.clone(),
            story
                .url
                .clone()
                .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={}", story.id)),
            format!("{} points · {} comments", story.score, story.comments),
            None,
        ),
    };

    TrendingItem {
        source_id,
        external_id,
        title: collapse_whitespace(&title),
        description: description
            .as_deref()
            .map(collapse_whitespace)
            .unwrap_or_default(),
        description_translated: None,
        translation_degraded: false,
        url,
        rank,
        metric_summary,
        language,
        captured_date: run_date,
    }
}

/// Key the natural-key uniqueness check runs on.
fn external_id(raw: &RawItem) -> String {
    match raw {
        RawItem::GitHub(repo) => repo.full_name.to_lowercase(),
        RawItem::ProductHunt(post) => post.id.clone(),
        RawItem::HackerNews(story) => story.id.to_string(),
    }
}

/// Turn a fetcher's list into the ranked items of one source for one run.
///
/// Duplicate ids keep their first occurrence, the list is cut to `max_items`,
/// and ranks `1..=n` follow the remaining order.
pub fn normalize_all(
    source_id: SourceId,
    raw: &[RawItem],
    max_items: usize,
    run_date: NaiveDate,
) -> Vec<TrendingItem> {
    raw.iter()
        .unique_by(|r| external_id(r))
        .take(max_items)
        .enumerate()
        .map(|(i, r)| normalize(source_id, r, i + 1, run_date))
        .collect()
}
