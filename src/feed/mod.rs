//! Feed discovery, fetching, parsing and normalization.
//!
//! The pipeline for one site URL, leaves first:
//!
//! - [`discovery`] - site URL → feed URL, via `<link>`/`<a>` inspection
//! - [`parser`] - feed URL → [`RawEntry`] list, using the `feed-rs` crate
//! - [`normalizer`] - [`RawEntry`] → [`PostDraft`](crate::storage::PostDraft)
//!
//! All network access goes through the [`HttpClient`] trait so the fetch
//! strategy (plain reqwest, a headless browser, a test stub) is injected
//! by the caller.
//!
//! # Example
//!
//! ```ignore
//! use gleaner::feed::{discover_feed, fetch_entries, normalize, ReqwestClient, HttpConfig};
//!
//! let client = ReqwestClient::new(HttpConfig::default())?;
//! if let Some(feed_url) = discover_feed(&client, "https://example.com").await {
//!     let drafts: Vec<_> = fetch_entries(&client, &feed_url)
//!         .await
//!         .into_iter()
//!         .filter_map(|e| normalize(e).ok())
//!         .collect();
//! }
//! ```

pub mod discovery;
pub mod http;
pub mod normalizer;
pub mod parser;

pub use discovery::{discover_feed, looks_like_feed_url, try_discover, DiscoveryError};
pub use http::{
    FetchError, HttpClient, HttpConfig, HttpResponse, ReqwestClient, DEFAULT_USER_AGENT,
};
pub use normalizer::{normalize, NormalizeError};
pub use parser::{fetch_entries, parse_feed, try_fetch_entries, ParseError, RawEntry};
