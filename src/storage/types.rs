use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The site URL or feed URL is already registered (as either column)
    #[error("A source with URL {0} already exists")]
    DuplicateSource(String),

    /// Another process holds the database lock
    #[error("Another process has the database locked. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, mapping SQLite lock conditions to `InstanceLocked`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// True when the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

// ============================================================================
// Input Types
// ============================================================================

/// A normalized entry ready to be stored as a post.
///
/// Produced by the normalizer; `published` is `None` when the feed gave no
/// usable date, in which case the store stamps the ingestion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub description: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub external_link: String,
    pub published: Option<i64>,
}

/// Result of offering a draft to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was written with this id
    Inserted(i64),
    /// A post with the same link, or the same title in the same source, exists
    Skipped,
}

impl UpsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A followed website or feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub url: String,
    pub feed_url: Option<String>,
    pub name: Option<String>,
    pub created_at: i64,
    pub last_checked: Option<i64>,
    pub is_active: bool,
}

impl Source {
    /// Name for display: the configured name, else the site URL.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

/// One stored feed entry.
///
/// `title`, `description` and `external_link` are the read-only inputs for
/// downstream post-generation features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub external_link: String,
    pub published_date: i64,
    pub created_at: i64,
    pub is_read: bool,
    pub read_at: Option<i64>,
}

impl Post {
    /// Image URLs split back out of the stored comma-joined column.
    pub fn image_urls(&self) -> Vec<&str> {
        self.image_url
            .as_deref()
            .map(|joined| {
                joined
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Counts from a reconciliation pass over one source's entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    /// Rows written
    pub added: usize,
    /// Drafts offered to the store
    pub seen: usize,
}
