use sqlx::SqliteConnection;

use super::schema::Database;
use super::types::{
    is_unique_violation, DatabaseError, Post, PostDraft, ReconcileCounts, UpsertOutcome,
};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of posts any single listing returns
const MAX_POSTS: i64 = 2000;

/// Default page size when the caller passes no limit
const DEFAULT_PAGE_SIZE: i64 = 50;

const POST_COLUMNS: &str = "id, source_id, title, description, summary, image_url, external_link, \
                            published_date, created_at, is_read, read_at";

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(0, MAX_POSTS)
}

/// Insert `draft` unless a post with the same link, or the same title in the
/// same source, already exists. Existing rows are never touched.
async fn insert_if_absent(
    conn: &mut SqliteConnection,
    source_id: i64,
    draft: &PostDraft,
    now: i64,
) -> Result<UpsertOutcome, sqlx::Error> {
    let existing: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM posts WHERE external_link = ? \
         UNION ALL \
         SELECT id FROM posts WHERE title = ? AND source_id = ? \
         LIMIT 1",
    )
    .bind(&draft.external_link)
    .bind(&draft.title)
    .bind(source_id)
    .fetch_optional(&mut *conn)
    .await?;

    if existing.is_some() {
        return Ok(UpsertOutcome::Skipped);
    }

    let inserted = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO posts (source_id, title, description, summary, image_url, external_link, \
                            published_date, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(source_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.summary)
    .bind(&draft.image_url)
    .bind(&draft.external_link)
    .bind(draft.published.unwrap_or(now))
    .bind(now)
    .fetch_one(&mut *conn)
    .await;

    match inserted {
        Ok((id,)) => Ok(UpsertOutcome::Inserted(id)),
        // Another writer inserted the same post between the lookup and the insert
        Err(e) if is_unique_violation(&e) => Ok(UpsertOutcome::Skipped),
        Err(e) => Err(e),
    }
}

impl Database {
    // ========================================================================
    // Post Reconciliation
    // ========================================================================

    /// Store a draft for `source_id` if it is not already present.
    ///
    /// Lookup order: `external_link` first, then `(title, source_id)`. A match
    /// on either is [`UpsertOutcome::Skipped`] and the existing row, including
    /// its read state, is left alone. A missing published date defaults to now.
    pub async fn upsert_post(
        &self,
        draft: &PostDraft,
        source_id: i64,
    ) -> Result<UpsertOutcome, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.pool.acquire().await?;
        let outcome = insert_if_absent(&mut conn, source_id, draft, now).await?;

        if outcome == UpsertOutcome::Skipped {
            tracing::debug!(
                source_id = source_id,
                link = %draft.external_link,
                "Post already present, skipping"
            );
        }
        Ok(outcome)
    }

    /// Replace every post of a source with `drafts`, atomically.
    ///
    /// Deletes the source's posts, then inserts the drafts with the same skip
    /// rules as [`upsert_post`](Self::upsert_post) (a feed listing one link
    /// twice yields one row). Read state is lost for re-inserted posts. If any
    /// statement fails the transaction is rolled back and the old posts stay.
    pub async fn replace_posts(
        &self,
        source_id: i64,
        drafts: &[PostDraft],
    ) -> Result<ReconcileCounts, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM posts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let mut counts = ReconcileCounts {
            added: 0,
            seen: drafts.len(),
        };
        for draft in drafts {
            if insert_if_absent(&mut tx, source_id, draft, now)
                .await?
                .is_inserted()
            {
                counts.added += 1;
            }
        }

        tx.commit().await?;

        tracing::debug!(
            source_id = source_id,
            removed = removed.rows_affected(),
            added = counts.added,
            seen = counts.seen,
            "Posts replaced"
        );
        Ok(counts)
    }

    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Page through all posts, newest first.
    ///
    /// `limit` defaults to 50 and is capped at 2000.
    pub async fn get_posts(&self, limit: Option<i64>, offset: i64) -> Result<Vec<Post>, DatabaseError> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY published_date DESC, id DESC LIMIT ? OFFSET ?"
        );
        let posts = sqlx::query_as::<_, Post>(&query)
            .bind(clamp_limit(limit))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    /// Total number of stored posts, for pagination.
    pub async fn count_posts(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Page through the posts of one source, newest first.
    pub async fn get_posts_for_source(
        &self,
        source_id: i64,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Post>, DatabaseError> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE source_id = ? \
             ORDER BY published_date DESC, id DESC LIMIT ? OFFSET ?"
        );
        let posts = sqlx::query_as::<_, Post>(&query)
            .bind(source_id)
            .bind(clamp_limit(limit))
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    /// Get a single post by id.
    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>, DatabaseError> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");
        let post = sqlx::query_as::<_, Post>(&query)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    // ========================================================================
    // Read State
    // ========================================================================

    /// Mark a post as read, stamping `read_at`.
    ///
    /// Idempotent: marking an already-read post only refreshes `read_at`.
    /// Returns false if the post does not exist.
    pub async fn mark_read(&self, post_id: i64) -> Result<bool, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE posts SET is_read = 1, read_at = ? WHERE id = ?")
            .bind(now)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a post as unread and clear `read_at`. Idempotent.
    ///
    /// Returns false if the post does not exist.
    pub async fn mark_unread(&self, post_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE posts SET is_read = 0, read_at = NULL WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
