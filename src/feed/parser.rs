use super::http::{FetchError, HttpClient};
use crate::util::html_to_text;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use scraper::{Html, Selector};
use thiserror::Error;

/// Title given to entries that have none.
pub const UNTITLED: &str = "Untitled";

/// Why a feed yielded no entries.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The feed could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The document is not a valid RSS/Atom/JSON feed
    #[error("malformed feed: {0}")]
    Malformed(#[from] feed_rs::parser::ParseFeedError),
}

/// One feed entry as published, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    /// HTML content body, else the entry summary
    pub description: String,
    /// Plain-text rendering of the summary, else of the description
    pub summary: String,
    pub link: Option<String>,
    /// Published date, else updated date
    pub published: Option<DateTime<Utc>>,
    /// Media attachment URLs, else the first inline `<img>`
    pub image_urls: Vec<String>,
}

/// Fetch and parse a feed. Never fails: any problem yields no entries.
pub async fn fetch_entries(client: &dyn HttpClient, feed_url: &str) -> Vec<RawEntry> {
    match try_fetch_entries(client, feed_url).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(feed = %feed_url, error = %e, "Feed unavailable");
            Vec::new()
        }
    }
}

/// Fetch and parse a feed, reporting why it failed.
pub async fn try_fetch_entries(
    client: &dyn HttpClient,
    feed_url: &str,
) -> Result<Vec<RawEntry>, ParseError> {
    let response = client.get(feed_url).await?.error_for_status()?;
    let entries = parse_feed(&response.body)?;
    tracing::debug!(feed = %feed_url, entries = entries.len(), "Feed parsed");
    Ok(entries)
}

/// Parse RSS, Atom or JSON Feed bytes into raw entries.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawEntry>, ParseError> {
    let feed = feed_rs::parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(raw_entry).collect())
}

fn raw_entry(entry: Entry) -> RawEntry {
    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| UNTITLED.to_string());

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());

    let published = entry.published.or(entry.updated);

    let summary_html = entry.summary.map(|s| s.content);
    let content_html = entry.content.and_then(|c| c.body);

    let mut image_urls = media_image_urls(&entry.media);
    if image_urls.is_empty() {
        image_urls.extend(
            [content_html.as_deref(), summary_html.as_deref()]
                .into_iter()
                .flatten()
                .find_map(first_inline_image),
        );
    }

    let summary = summary_html
        .as_deref()
        .map(html_to_text)
        .filter(|s| !s.is_empty());
    let description = content_html
        .filter(|c| !c.trim().is_empty())
        .or(summary_html)
        .unwrap_or_default();
    let summary = summary.unwrap_or_else(|| html_to_text(&description));

    RawEntry {
        title,
        description,
        summary,
        link,
        published,
        image_urls,
    }
}

/// Image URLs attached as media (media:content, enclosures), in document
/// order, without repeats. A media object's thumbnails are used only when it
/// carries no image content of its own.
fn media_image_urls(media: &[feed_rs::model::MediaObject]) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    for object in media {
        let mut found: Vec<String> = object
            .content
            .iter()
            .filter(|c| {
                c.content_type
                    .as_ref()
                    .is_none_or(|mime| mime.essence().to_string().starts_with("image/"))
            })
            .filter_map(|c| c.url.as_ref().map(|u| u.to_string()))
            .collect();
        if found.is_empty() {
            found = object.thumbnails.iter().map(|t| t.image.uri.clone()).collect();
        }

        for url in found {
            if !url.is_empty() && !urls.contains(&url) {
                urls.push(url);
            }
        }
    }

    urls
}

fn first_inline_image(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img[src]").ok()?;
    fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_owned)
}
