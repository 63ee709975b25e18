use super::schema::Database;
use super::types::{is_unique_violation, DatabaseError, Source};

const SOURCE_COLUMNS: &str = "id, url, feed_url, name, created_at, last_checked, is_active";

impl Database {
    // ========================================================================
    // Source Operations
    // ========================================================================

    /// Register a new source.
    ///
    /// Both `created_at` and `last_checked` are stamped with the current time.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::DuplicateSource`] when `url` or `feed_url` matches any
    /// existing source's site URL or feed URL. The cross-column check keeps a
    /// feed from being registered once as a site and again as a feed.
    pub async fn add_source(
        &self,
        url: &str,
        feed_url: Option<&str>,
        name: Option<&str>,
    ) -> Result<Source, DatabaseError> {
        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM sources WHERE url IN (?1, ?2) OR feed_url IN (?1, ?2) LIMIT 1",
        )
        .bind(url)
        .bind(feed_url)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Err(DatabaseError::DuplicateSource(url.to_owned()));
        }

        let now = chrono::Utc::now().timestamp();
        let query = format!(
            "INSERT INTO sources (url, feed_url, name, created_at, last_checked, is_active) \
             VALUES (?, ?, ?, ?, ?, 1) RETURNING {SOURCE_COLUMNS}"
        );

        // A concurrent insert can still win the race; the UNIQUE columns catch it.
        match sqlx::query_as::<_, Source>(&query)
            .bind(url)
            .bind(feed_url)
            .bind(name)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
        {
            Ok(source) => {
                tracing::info!(source_id = source.id, url = %url, feed_url = ?feed_url, "Source added");
                Ok(source)
            }
            Err(e) if is_unique_violation(&e) => Err(DatabaseError::DuplicateSource(url.to_owned())),
            Err(e) => Err(e.into()),
        }
    }

    /// List sources ordered by creation, optionally only the active ones.
    pub async fn list_sources(&self, active_only: bool) -> Result<Vec<Source>, DatabaseError> {
        let query = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE (?1 = 0 OR is_active = 1) ORDER BY created_at, id"
        );
        let sources = sqlx::query_as::<_, Source>(&query)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    /// Get a single source by id.
    pub async fn get_source(&self, source_id: i64) -> Result<Option<Source>, DatabaseError> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?");
        let source = sqlx::query_as::<_, Source>(&query)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    /// Find the source registered under `url`, as either its site or feed URL.
    pub async fn find_source_by_url(&self, url: &str) -> Result<Option<Source>, DatabaseError> {
        let query = format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE url = ?1 OR feed_url = ?1 ORDER BY id LIMIT 1"
        );
        let source = sqlx::query_as::<_, Source>(&query)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    /// Set the feed URL for a source and stamp `last_checked`.
    ///
    /// Returns false if the source does not exist.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::DuplicateSource`] when another source already uses the feed URL.
    pub async fn update_source_feed(
        &self,
        source_id: i64,
        feed_url: &str,
    ) -> Result<bool, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE sources SET feed_url = ?, last_checked = ? WHERE id = ?")
            .bind(feed_url)
            .bind(now)
            .bind(source_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if is_unique_violation(&e) => {
                Err(DatabaseError::DuplicateSource(feed_url.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stamp `last_checked` with the current time.
    pub async fn touch_source_checked(&self, source_id: i64) -> Result<(), DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE sources SET last_checked = ? WHERE id = ?")
            .bind(now)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Activate or deactivate a source. Inactive sources keep their posts.
    ///
    /// Returns false if the source does not exist.
    pub async fn set_source_active(
        &self,
        source_id: i64,
        active: bool,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE sources SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a source and all of its posts.
    ///
    /// Posts are removed explicitly inside the same transaction rather than
    /// relying on the cascade alone; if either statement fails nothing is
    /// deleted. Returns false if the source does not exist.
    pub async fn delete_source(&self, source_id: i64) -> Result<bool, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let posts = sqlx::query("DELETE FROM posts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let source = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        if source.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;

        tracing::info!(
            source_id = source_id,
            posts_removed = posts.rows_affected(),
            "Source deleted"
        );
        Ok(true)
    }
}
