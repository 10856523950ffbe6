//! Product Hunt feed reader.
//!
//! Product Hunt publishes its daily leaderboard as an Atom feed at
//! <https://www.producthunt.com/feed>, optionally per category
//! (`?category=<slug>`). Entries come in leaderboard order. The feed has no
//! vote counts, so these listings carry no metric.

use super::{SourceFetcher, get_text};
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{FetchParams, ProductHuntPost, RawItem, SourceId, TimeWindow};
use crate::utils::{collapse_whitespace, truncate_for_log};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, instrument};

const FEED_URL: &str = "https://www.producthunt.com/feed";

static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector"));

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    title: String,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "$text", default)]
    html: String,
}

#[derive(Debug, Clone)]
pub struct ProductHuntFeed {
    client: Client,
}

impl ProductHuntFeed {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

pub fn feed_url(params: &FetchParams) -> String {
    match params.filter.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(category) => format!("{FEED_URL}?category={}", urlencoding::encode(category)),
        None => FEED_URL.to_string(),
    }
}

#[async_trait]
impl SourceFetcher for ProductHuntFeed {
    fn source_id(&self) -> SourceId {
        SourceId::ProductHunt
    }

    #[instrument(level = "info", skip_all, fields(filter = ?params.filter))]
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, SourceError> {
        if params.window != TimeWindow::Daily {
            debug!(window = params.window.as_str(), "Feed is daily only; window ignored");
        }
        let url = feed_url(params);
        let xml = get_text(&self.client, SourceId::ProductHunt, &url).await?;
        let posts = parse_feed(&xml)?;
        info!(count = posts.len(), %url, "Parsed Product Hunt feed");
        Ok(posts.into_iter().map(RawItem::ProductHunt).collect())
    }
}

/// Parse the Atom feed into posts, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<ProductHuntPost>, SourceError> {
    let feed: Feed = quick_xml::de::from_str(xml).map_err(|e| {
        SourceError::new(
            SourceId::ProductHunt,
            SourceErrorKind::Parse,
            format!("invalid Atom feed: {e} (body: {})", truncate_for_log(xml, 200)),
        )
    })?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone())?;
            let tagline = entry.content.as_ref().and_then(|c| first_paragraph(&c.html));
            Some(ProductHuntPost {
                id: entry.id.trim().to_string(),
                name: collapse_whitespace(&entry.title),
                url,
                tagline,
            })
        })
        .collect())
}

/// The tagline is the first `<p>` of the entry's HTML content.
fn first_paragraph(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let text = match fragment.select(&PARAGRAPH).next() {
        Some(p) => p.text().collect::<Vec<_>>().join(" "),
        None => fragment.root_element().text().collect::<Vec<_>>().join(" "),
    };
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}
