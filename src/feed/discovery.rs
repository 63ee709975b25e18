use super::http::{FetchError, HttpClient};
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

/// Substrings that mark a URL (or `<a href>`) as pointing at a feed.
const FEED_URL_MARKERS: [&str; 3] = ["rss", "atom", "feed"];

/// Reasons discovery produced no feed URL. None of them are fatal.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The site URL could not be parsed
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The page could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// The page was fetched but advertises no feed
    #[error("no feed link found")]
    NoFeedFound,
}

/// True when a URL already names a feed, so discovery can be skipped.
///
/// Matches `rss`, `atom` or `feed` anywhere in the URL, case-insensitively.
pub fn looks_like_feed_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    FEED_URL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Resolve a site URL to its feed URL, or `None`.
///
/// Failures are logged and swallowed; see [`try_discover`] for the reason.
pub async fn discover_feed(client: &dyn HttpClient, site_url: &str) -> Option<String> {
    match try_discover(client, site_url).await {
        Ok(feed_url) => Some(feed_url),
        Err(DiscoveryError::NoFeedFound) => {
            tracing::info!(url = %site_url, "No feed advertised");
            None
        }
        Err(e) => {
            tracing::warn!(url = %site_url, error = %e, "Feed discovery failed");
            None
        }
    }
}

/// Resolve a site URL to its feed URL.
///
/// A URL that already looks like a feed is returned unchanged without a
/// request. Otherwise the page is fetched and searched, first match wins:
///
/// 1. `<link>` elements whose `type` is an RSS/Atom/feed MIME type
/// 2. `<a>` elements whose `href` mentions `feed`, `rss` or `atom`
///
/// Relative hrefs are resolved against `site_url`.
pub async fn try_discover(client: &dyn HttpClient, site_url: &str) -> Result<String, DiscoveryError> {
    let base = Url::parse(site_url)?;

    if looks_like_feed_url(site_url) {
        tracing::debug!(url = %site_url, "URL looks like a feed, skipping discovery");
        return Ok(site_url.to_owned());
    }

    let response = client.get(base.as_str()).await?.error_for_status()?;
    let html = String::from_utf8_lossy(&response.body);

    let feed_url = find_feed_link_in_html(&html, &base).ok_or(DiscoveryError::NoFeedFound)?;
    tracing::debug!(url = %site_url, feed_url = %feed_url, "Discovered feed");
    Ok(feed_url)
}

fn find_feed_link_in_html(html: &str, base: &Url) -> Option<String> {
    let document = Html::parse_document(html);

    let link_selector = Selector::parse("link[type][href]").ok()?;
    let from_link = document
        .select(&link_selector)
        .filter(|el| el.value().attr("type").is_some_and(is_feed_type))
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| resolve_url(href, base));
    if from_link.is_some() {
        return from_link;
    }

    let anchor_selector = Selector::parse("a[href]").ok()?;
    document
        .select(&anchor_selector)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| looks_like_feed_url(href))
        .find_map(|href| resolve_url(href, base))
}

fn is_feed_type(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.contains("rss") || mime.contains("atom") || mime.contains("feed+xml")
}

/// Resolves a possibly relative href against the page URL.
///
/// Only http(s) results are kept, so `javascript:` or `mailto:` hrefs that
/// happen to mention a feed are ignored.
fn resolve_url(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
