//! Hacker News top stories via the official Firebase API.
//!
//! `topstories.json` (daily) or `beststories.json` (weekly/monthly) gives the
//! ranked id list; each id is then resolved through `item/<id>.json`. Item
//! lookups run concurrently but results keep the id list's order.

use super::{SourceFetcher, check_status};
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{FetchParams, HackerNewsStory, RawItem, SourceId, TimeWindow};
use crate::utils::collapse_whitespace;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";
const ITEM_CONCURRENCY: usize = 8;

/// Wire shape of `item/<id>.json`.
#[derive(Debug, Deserialize)]
pub struct HnItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub descendants: u64,
    pub by: Option<String>,
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct HackerNewsTop {
    client: Client,
    api_base: String,
}

impl HackerNewsTop {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: API_BASE.to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(SourceId::HackerNews, &e))?;
        check_status(SourceId::HackerNews, resp)?
            .json::<T>()
            .await
            .map_err(|e| SourceError::from_reqwest(SourceId::HackerNews, &e))
    }
}

pub fn list_endpoint(window: TimeWindow) -> &'static str {
    match window {
        TimeWindow::Daily => "topstories",
        TimeWindow::Weekly | TimeWindow::Monthly => "beststories",
    }
}

#[async_trait]
impl SourceFetcher for HackerNewsTop {
    fn source_id(&self) -> SourceId {
        SourceId::HackerNews
    }

    #[instrument(level = "info", skip_all, fields(window = params.window.as_str()))]
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, SourceError> {
        let list_url = format!("{}/{}.json", self.api_base, list_endpoint(params.window));
        let ids: Vec<u64> = self.get_json(&list_url).await?;
        if ids.is_empty() {
            return Err(SourceError::new(
                SourceId::HackerNews,
                SourceErrorKind::Parse,
                "story list is empty",
            ));
        }
        debug!(ids = ids.len(), "Fetched story ids");

        // Over-fetch a little: dead/deleted/non-story ids are dropped below.
        let wanted = params.max_items.saturating_add(5).min(ids.len());
        let items: Vec<Option<HnItem>> = stream::iter(ids.into_iter().take(wanted))
            .map(|id| async move {
                let url = format!("{}/item/{}.json", self.api_base, id);
                match self.get_json::<Option<HnItem>>(&url).await {
                    Ok(item) => item,
                    Err(e) => {
                        warn!(id, error = %e, "Story lookup failed; skipping");
                        None
                    }
                }
            })
            .buffered(ITEM_CONCURRENCY)
            .collect()
            .await;

        let stories: Vec<RawItem> = items
            .into_iter()
            .flatten()
            .filter_map(into_story)
            .map(RawItem::HackerNews)
            .collect();

        if stories.is_empty() {
            return Err(SourceError::new(
                SourceId::HackerNews,
                SourceErrorKind::Network,
                "every story lookup failed",
            ));
        }
        info!(count = stories.len(), "Fetched Hacker News stories");
        Ok(stories)
    }
}

/// Keep live stories only; self-post HTML is flattened to text.
pub fn into_story(item: HnItem) -> Option<HackerNewsStory> {
    if item.dead || item.deleted || item.kind.as_deref() != Some("story") {
        return None;
    }
    let title = collapse_whitespace(item.title.as_deref()?);
    if title.is_empty() {
        return None;
    }
    let text = item
        .text
        .as_deref()
        .map(html_to_text)
        .filter(|t| !t.is_empty());
    Some(HackerNewsStory {
        id: item.id,
        title,
        url: item.url.filter(|u| !u.trim().is_empty()),
        text,
        score: item.score,
        comments: item.descendants,
        author: item.by,
    })
}

fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    collapse_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(json: &str) -> HnItem {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_story_is_kept() {
        let s = into_story(item(
            r#"{"id": 42, "type": "story", "title": "Show HN: A thing", "url": "https://thing.dev", "score": 321, "descendants": 45, "by": "alice"}"#,
        ))
        .unwrap();
        assert_eq!(s.id, 42);
        assert_eq!(s.title, "Show HN: A thing");
        assert_eq!(s.url.as_deref(), Some("https://thing.dev"));
        assert_eq!(s.score, 321);
        assert_eq!(s.comments, 45);
        assert_eq!(s.text, None);
    }

    #[test]
    fn test_self_post_text_is_flattened() {
        let s = into_story(item(
            r#"{"id": 7, "type": "story", "title": "Ask HN: Why?", "text": "I wonder <i>why</i>.<p>Really &amp; truly."}"#,
        ))
        .unwrap();
        assert_eq!(s.url, None);
        assert_eq!(s.text.as_deref(), Some("I wonder why . Really & truly."));
    }

    #[test]
    fn test_non_stories_and_dead_items_are_dropped() {
        assert!(into_story(item(r#"{"id": 1, "type": "job", "title": "Hiring"}"#)).is_none());
        assert!(
            into_story(item(r#"{"id": 2, "type": "story", "title": "x", "dead": true}"#)).is_none()
        );
        assert!(into_story(item(r#"{"id": 3, "type": "story"}"#)).is_none());
    }

    #[test]
    fn test_list_endpoint_by_window() {
        assert_eq!(list_endpoint(TimeWindow::Daily), "topstories");
        assert_eq!(list_endpoint(TimeWindow::Weekly), "beststories");
    }
}
