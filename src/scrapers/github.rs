//! GitHub Trending scraper.
//!
//! Scrapes <https://github.com/trending>, optionally narrowed to one
//! programming language (`/trending/<language>`) and a window
//! (`?since=daily|weekly|monthly`). Each repository is an `article.Box-row`;
//! the page order is GitHub's ranking and is kept as is.

use super::{SourceFetcher, get_text};
use crate::error::{SourceError, SourceErrorKind};
use crate::models::{FetchParams, GitHubRepo, RawItem, SourceId, TimeWindow};
use crate::utils::{collapse_whitespace, parse_count};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

const TRENDING_URL: &str = "https://github.com/trending";

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("article.Box-row").expect("row selector"));
static NAME_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h2 a[href]").expect("name selector"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("p selector"));
static LANGUAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"span[itemprop="programmingLanguage"]"#).expect("lang selector"));
static STARS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href$="/stargazers"]"#).expect("stars selector"));
static FORKS: Lazy<Selector> = Lazy::new(|| Selector::parse(r#"a[href$="/forks"]"#).expect("forks selector"));
static WINDOW_STARS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.d-inline-block.float-sm-right").expect("window stars selector"));

#[derive(Debug, Clone)]
pub struct GitHubTrending {
    client: Client,
}

impl GitHubTrending {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Page URL for a language filter and window.
pub fn trending_url(params: &FetchParams) -> String {
    let mut url = TRENDING_URL.to_string();
    if let Some(lang) = params.filter.as_deref().map(str::trim).filter(|l| !l.is_empty() && *l != "any") {
        url.push('/');
        url.push_str(&urlencoding::encode(&lang.to_lowercase()));
    }
    url.push_str("?since=");
    url.push_str(params.window.as_str());
    url
}

#[async_trait]
impl SourceFetcher for GitHubTrending {
    fn source_id(&self) -> SourceId {
        SourceId::GitHub
    }

    #[instrument(level = "info", skip_all, fields(filter = ?params.filter, window = params.window.as_str()))]
    async fn fetch(&self, params: &FetchParams) -> Result<Vec<RawItem>, SourceError> {
        let url = trending_url(params);
        let html = get_text(&self.client, SourceId::GitHub, &url).await?;
        let repos = parse_trending_page(&html, params.window)?;
        info!(count = repos.len(), %url, "Parsed GitHub trending page");
        Ok(repos.into_iter().map(RawItem::GitHub).collect())
    }
}

/// Parse a trending page. A page without any repository rows is a parse error:
/// it almost always means the markup changed.
pub fn parse_trending_page(html: &str, window: TimeWindow) -> Result<Vec<GitHubRepo>, SourceError> {
    let document = Html::parse_document(html);
    let base = Url::parse("https://github.com").map_err(|e| {
        SourceError::new(SourceId::GitHub, SourceErrorKind::Parse, e.to_string())
    })?;

    let mut repos = Vec::new();
    let mut rows = 0usize;
    for row in document.select(&ROW) {
        rows += 1;
        match parse_row(row, &base, window) {
            Some(repo) => repos.push(repo),
            None => warn!(row = rows, "Skipping trending row without a repository link"),
        }
    }

    if rows == 0 {
        return Err(SourceError::new(
            SourceId::GitHub,
            SourceErrorKind::Parse,
            "no repository rows found; page layout may have changed",
        ));
    }
    debug!(rows, parsed = repos.len(), "GitHub rows");
    Ok(repos)
}

fn parse_row(row: ElementRef<'_>, base: &Url, window: TimeWindow) -> Option<GitHubRepo> {
    let link = row.select(&NAME_LINK).next()?;
    let href = link.value().attr("href")?;
    let full_name = href.trim_matches('/').to_string();
    if full_name.split('/').count() != 2 {
        return None;
    }
    let url = base.join(href).ok()?.to_string();

    let description = row
        .select(&DESCRIPTION)
        .next()
        .map(|p| collapse_whitespace(&element_text(p)))
        .filter(|d| !d.is_empty());
    let language = row
        .select(&LANGUAGE)
        .next()
        .map(|s| collapse_whitespace(&element_text(s)))
        .filter(|l| !l.is_empty());
    let stars = row.select(&STARS).next().map(|a| parse_count(&element_text(a))).unwrap_or(0);
    let forks = row.select(&FORKS).next().map(|a| parse_count(&element_text(a))).unwrap_or(0);
    let stars_in_window = row
        .select(&WINDOW_STARS)
        .next()
        .map(|s| parse_count(&element_text(s)))
        .unwrap_or(0);

    Some(GitHubRepo {
        full_name,
        url,
        description,
        language,
        stars,
        forks,
        stars_in_window,
        window,
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}
