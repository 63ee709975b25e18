//! Batch ingestion and source refresh.
//!
//! [`Ingestor`] drives the whole pipeline for a list of site URLs:
//! normalize URL → discover feed → register source → parse → normalize
//! entries → upsert posts. Each URL is handled independently; one failing
//! site never aborts the batch, and the report lists outcomes in input order.

use crate::feed::{
    normalize, try_discover, try_fetch_entries, FetchError, HttpClient, ParseError, RawEntry,
};
use crate::storage::{Database, DatabaseError, PostDraft, Source, UpsertOutcome};
use crate::util::normalize_site_url;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum IngestError {
    /// Refresh needs a feed URL and the source was registered without one
    #[error("source {source_id} has no feed URL")]
    NoFeedUrl { source_id: i64 },

    #[error("source {0} not found")]
    SourceNotFound(i64),

    /// The source is paused; resume it before refreshing
    #[error("source {0} is paused")]
    SourceInactive(i64),

    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    #[error("{0}")]
    Parse(ParseError),

    #[error("storage failure: {0}")]
    Database(#[from] DatabaseError),
}

impl From<ParseError> for IngestError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Fetch(e) => IngestError::Fetch(e),
            other => IngestError::Parse(other),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// How a refresh reconciles a source's stored posts with its current feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStrategy {
    /// Delete every post of the source, then insert the feed's entries.
    /// Entries that left the feed disappear; read state is reset.
    #[default]
    Rebuild,
    /// Upsert the feed's entries. Existing posts and their read state stay.
    Merge,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Upper bound on sites fetched at once
    pub max_concurrent_fetches: usize,
    pub refresh_strategy: RefreshStrategy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            refresh_strategy: RefreshStrategy::default(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// What happened to one submitted URL (or one refreshed source).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlOutcome {
    /// The URL as submitted
    pub url: String,
    pub resolved_feed_url: Option<String>,
    pub source_id: Option<i64>,
    /// Entries in the feed
    pub posts_found: usize,
    /// Entries stored as new posts
    pub posts_added: usize,
    /// Entries dropped by normalization (no link)
    pub posts_rejected: usize,
    pub error: Option<String>,
}

impl UrlOutcome {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            ..Self::default()
        }
    }

    fn failed(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Entries that were already stored.
    pub fn posts_skipped(&self) -> usize {
        self.posts_found
            .saturating_sub(self.posts_added)
            .saturating_sub(self.posts_rejected)
    }
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<UrlOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn posts_added(&self) -> usize {
        self.outcomes.iter().map(|o| o.posts_added).sum()
    }
}

/// Result of refreshing one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshCounts {
    /// Entries in the feed
    pub found: usize,
    /// Posts written
    pub added: usize,
    /// Entries dropped by normalization
    pub rejected: usize,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs ingestion against one store and one injected HTTP client.
#[derive(Clone)]
pub struct Ingestor {
    db: Database,
    client: Arc<dyn HttpClient>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(db: Database, client: Arc<dyn HttpClient>, config: IngestConfig) -> Self {
        Self { db, client, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn concurrency(&self) -> usize {
        self.config.max_concurrent_fetches.max(1)
    }

    /// Ingest a batch of site URLs.
    ///
    /// Up to `max_concurrent_fetches` sites are processed at once. Never
    /// fails as a whole: every URL gets an outcome, failures included.
    pub async fn ingest_urls<I, S>(&self, urls: I) -> IngestReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls.into_iter().map(|u| u.as_ref().to_owned()).collect();
        tracing::info!(count = urls.len(), "Starting ingestion");

        let outcomes: Vec<UrlOutcome> = stream::iter(urls)
            .map(move |url| async move { self.ingest_one(&url).await })
            .buffered(self.concurrency())
            .collect()
            .await;

        let report = IngestReport { outcomes };
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            added = report.posts_added(),
            "Ingestion finished"
        );
        report
    }

    async fn ingest_one(&self, input: &str) -> UrlOutcome {
        let outcome = UrlOutcome::new(input);
        let site_url = normalize_site_url(input);
        if site_url.is_empty() {
            return outcome.failed("empty URL");
        }

        let feed_url = match try_discover(self.client.as_ref(), &site_url).await {
            Ok(feed_url) => feed_url,
            Err(e) => {
                tracing::warn!(url = %site_url, error = %e, "No feed resolved");
                return outcome.failed(e);
            }
        };

        let source = match self.register(&site_url, &feed_url).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(url = %site_url, error = %e, "Could not register source");
                return UrlOutcome {
                    resolved_feed_url: Some(feed_url),
                    ..outcome
                }
                .failed(e);
            }
        };

        // An existing registration keeps its own feed URL
        let feed_url = source.feed_url.clone().unwrap_or(feed_url);
        let mut outcome = UrlOutcome {
            resolved_feed_url: Some(feed_url.clone()),
            source_id: Some(source.id),
            ..outcome
        };

        if !source.is_active {
            tracing::info!(source_id = source.id, url = %site_url, "Source is paused, not fetching");
            return outcome.failed(IngestError::SourceInactive(source.id));
        }

        let entries = match try_fetch_entries(self.client.as_ref(), &feed_url).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(source_id = source.id, feed = %feed_url, error = %e, "Feed unavailable");
                self.touch(source.id).await;
                return outcome.failed(e);
            }
        };

        outcome.posts_found = entries.len();
        let (drafts, rejected) = normalize_all(entries, source.id);
        outcome.posts_rejected = rejected;

        for draft in &drafts {
            match self.db.upsert_post(draft, source.id).await {
                Ok(UpsertOutcome::Inserted(_)) => outcome.posts_added += 1,
                Ok(UpsertOutcome::Skipped) => {}
                Err(e) => {
                    tracing::warn!(
                        source_id = source.id,
                        link = %draft.external_link,
                        error = %e,
                        "Failed to store post"
                    );
                    outcome.error = Some(e.to_string());
                }
            }
        }
        self.touch(source.id).await;

        tracing::info!(
            url = %site_url,
            source_id = source.id,
            found = outcome.posts_found,
            added = outcome.posts_added,
            rejected = outcome.posts_rejected,
            "Source ingested"
        );
        outcome
    }

    /// Register a source, or return the existing one that already claims
    /// the site or feed URL.
    async fn register(&self, site_url: &str, feed_url: &str) -> Result<Source, DatabaseError> {
        match self.db.add_source(site_url, Some(feed_url), None).await {
            Ok(source) => Ok(source),
            Err(DatabaseError::DuplicateSource(url)) => {
                let existing = match self.db.find_source_by_url(site_url).await? {
                    Some(source) => Some(source),
                    None => self.db.find_source_by_url(feed_url).await?,
                };
                let Some(mut source) = existing else {
                    return Err(DatabaseError::DuplicateSource(url));
                };

                if source.feed_url.is_none() {
                    match self.db.update_source_feed(source.id, feed_url).await {
                        Ok(_) => source.feed_url = Some(feed_url.to_owned()),
                        Err(e) => tracing::warn!(source_id = source.id, error = %e, "Could not record feed URL"),
                    }
                }

                tracing::debug!(source_id = source.id, url = %site_url, "Reusing existing source");
                Ok(source)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-read a registered source's feed and reconcile its posts using the
    /// configured [`RefreshStrategy`].
    ///
    /// The feed is fetched and parsed before anything is written, so a
    /// failed fetch or a malformed feed leaves the stored posts untouched.
    /// `last_checked` is updated on every attempt. A paused source is not
    /// attempted at all.
    ///
    /// # Errors
    ///
    /// - [`IngestError::SourceNotFound`] for an unknown id
    /// - [`IngestError::SourceInactive`] when the source is paused
    /// - [`IngestError::NoFeedUrl`] when the source has no feed URL
    /// - [`IngestError::Fetch`] / [`IngestError::Parse`] when the feed is unavailable
    /// - [`IngestError::Database`] on storage failure
    pub async fn refresh_source(&self, source_id: i64) -> Result<RefreshCounts, IngestError> {
        let source = self
            .db
            .get_source(source_id)
            .await?
            .ok_or(IngestError::SourceNotFound(source_id))?;
        if !source.is_active {
            return Err(IngestError::SourceInactive(source_id));
        }

        let result = self.refresh(&source).await;
        self.touch(source_id).await;

        match &result {
            Ok(counts) => tracing::info!(
                source_id = source_id,
                found = counts.found,
                added = counts.added,
                "Source refreshed"
            ),
            Err(e) => tracing::warn!(source_id = source_id, error = %e, "Refresh failed"),
        }
        result
    }

    async fn refresh(&self, source: &Source) -> Result<RefreshCounts, IngestError> {
        let feed_url = source.feed_url.as_deref().ok_or(IngestError::NoFeedUrl {
            source_id: source.id,
        })?;

        let entries = try_fetch_entries(self.client.as_ref(), feed_url).await?;
        let found = entries.len();
        let (drafts, rejected) = normalize_all(entries, source.id);

        let added = match self.config.refresh_strategy {
            // An empty feed is more likely a publishing glitch than a purge
            RefreshStrategy::Rebuild if drafts.is_empty() => 0,
            RefreshStrategy::Rebuild => self.db.replace_posts(source.id, &drafts).await?.added,
            RefreshStrategy::Merge => {
                let mut added = 0;
                for draft in &drafts {
                    if self.db.upsert_post(draft, source.id).await?.is_inserted() {
                        added += 1;
                    }
                }
                added
            }
        };

        Ok(RefreshCounts {
            found,
            added,
            rejected,
        })
    }

    /// Refresh every active source.
    ///
    /// Outcomes are labelled by source (`url` is the site URL) and listed
    /// in source order.
    pub async fn refresh_all(&self) -> Result<IngestReport, IngestError> {
        let sources = self.db.list_sources(true).await?;
        tracing::info!(count = sources.len(), "Refreshing active sources");

        let outcomes = stream::iter(sources)
            .map(move |source| async move {
                let outcome = UrlOutcome {
                    resolved_feed_url: source.feed_url.clone(),
                    source_id: Some(source.id),
                    ..UrlOutcome::new(&source.url)
                };
                match self.refresh_source(source.id).await {
                    Ok(counts) => UrlOutcome {
                        posts_found: counts.found,
                        posts_added: counts.added,
                        posts_rejected: counts.rejected,
                        ..outcome
                    },
                    Err(e) => outcome.failed(e),
                }
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        Ok(IngestReport { outcomes })
    }

    async fn touch(&self, source_id: i64) {
        if let Err(e) = self.db.touch_source_checked(source_id).await {
            tracing::warn!(source_id = source_id, error = %e, "Failed to update last_checked");
        }
    }
}

/// Normalize entries, returning the drafts and how many were rejected.
fn normalize_all(entries: Vec<RawEntry>, source_id: i64) -> (Vec<PostDraft>, usize) {
    let total = entries.len();
    let drafts: Vec<PostDraft> = entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.clone();
            normalize(entry)
                .inspect_err(|e| {
                    tracing::debug!(source_id = source_id, title = %title, error = %e, "Entry rejected")
                })
                .ok()
        })
        .collect();
    let rejected = total - drafts.len();
    (drafts, rejected)
}
