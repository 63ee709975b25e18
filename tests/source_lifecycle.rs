//! Integration tests for the source lifecycle: register, store posts, read,
//! pause, delete.
//!
//! Each test creates its own in-memory SQLite database for isolation.
//! These tests exercise the storage layer end-to-end, verifying that
//! operations compose correctly across sources and posts.

use gleaner::storage::{Database, DatabaseError, PostDraft, UpsertOutcome};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn test_draft(slug: &str, title: &str) -> PostDraft {
    PostDraft {
        title: title.to_string(),
        description: format!("<p>{}</p>", title),
        summary: Some(title.to_string()),
        image_url: None,
        external_link: format!("https://example.com/posts/{}", slug),
        published: Some(1_700_000_000),
    }
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_registered_source_appears_in_list() {
    let db = test_db().await;

    let source = db
        .add_source(
            "https://example.com",
            Some("https://example.com/feed.xml"),
            Some("Example"),
        )
        .await
        .unwrap();
    assert!(source.id > 0);
    assert!(source.is_active);

    let sources = db.list_sources(true).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0], source);
    assert_eq!(sources[0].display_name(), "Example");
}

#[tokio::test]
async fn test_submitting_existing_feed_url_as_site_is_duplicate() {
    let db = test_db().await;
    db.add_source("https://example.com", Some("https://example.com/feed.xml"), None)
        .await
        .unwrap();

    let result = db
        .add_source("https://example.com/feed.xml", None, None)
        .await;

    assert!(matches!(result, Err(DatabaseError::DuplicateSource(_))));
    assert_eq!(db.list_sources(false).await.unwrap().len(), 1);
}

// ============================================================================
// Posts
// ============================================================================

#[tokio::test]
async fn test_posts_are_scoped_to_source() {
    let db = test_db().await;
    let a = db.add_source("https://a.example.com", None, None).await.unwrap();
    let b = db.add_source("https://b.example.com", None, None).await.unwrap();

    db.upsert_post(&test_draft("a1", "A one"), a.id).await.unwrap();
    db.upsert_post(&test_draft("a2", "A two"), a.id).await.unwrap();
    db.upsert_post(&test_draft("b1", "B one"), b.id).await.unwrap();

    assert_eq!(db.get_posts_for_source(a.id, None, 0).await.unwrap().len(), 2);
    assert_eq!(db.get_posts_for_source(b.id, None, 0).await.unwrap().len(), 1);
    assert_eq!(db.count_posts().await.unwrap(), 3);
}

#[tokio::test]
async fn test_read_state_round_trip() {
    let db = test_db().await;
    let source = db.add_source("https://example.com", None, None).await.unwrap();
    let UpsertOutcome::Inserted(post_id) = db
        .upsert_post(&test_draft("p", "Post"), source.id)
        .await
        .unwrap()
    else {
        panic!("expected insert");
    };

    assert!(db.mark_read(post_id).await.unwrap());
    let post = db.get_post(post_id).await.unwrap().unwrap();
    assert!(post.is_read);
    assert!(post.read_at.is_some());

    assert!(db.mark_unread(post_id).await.unwrap());
    let post = db.get_post(post_id).await.unwrap().unwrap();
    assert!(!post.is_read);
    assert!(post.read_at.is_none());
}

// ============================================================================
// Pause / Resume
// ============================================================================

#[tokio::test]
async fn test_paused_source_keeps_posts() {
    let db = test_db().await;
    let source = db.add_source("https://example.com", None, None).await.unwrap();
    db.upsert_post(&test_draft("p", "Post"), source.id).await.unwrap();

    assert!(db.set_source_active(source.id, false).await.unwrap());

    assert!(db.list_sources(true).await.unwrap().is_empty());
    assert_eq!(db.list_sources(false).await.unwrap().len(), 1);
    assert_eq!(db.get_posts_for_source(source.id, None, 0).await.unwrap().len(), 1);

    assert!(db.set_source_active(source.id, true).await.unwrap());
    assert_eq!(db.list_sources(true).await.unwrap().len(), 1);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_source_removes_its_posts() {
    let db = test_db().await;
    let doomed = db.add_source("https://doomed.example.com", None, None).await.unwrap();
    let kept = db.add_source("https://kept.example.com", None, None).await.unwrap();

    db.upsert_post(&test_draft("d1", "Doomed one"), doomed.id).await.unwrap();
    db.upsert_post(&test_draft("d2", "Doomed two"), doomed.id).await.unwrap();
    db.upsert_post(&test_draft("k1", "Kept one"), kept.id).await.unwrap();

    assert!(db.delete_source(doomed.id).await.unwrap());

    assert!(db.get_source(doomed.id).await.unwrap().is_none());
    assert!(db.get_posts_for_source(doomed.id, None, 0).await.unwrap().is_empty());
    assert_eq!(db.count_posts().await.unwrap(), 1);

    // Deleting again reports absence
    assert!(!db.delete_source(doomed.id).await.unwrap());
}

#[tokio::test]
async fn test_deleted_link_can_be_stored_again() {
    let db = test_db().await;
    let first = db.add_source("https://first.example.com", None, None).await.unwrap();
    db.upsert_post(&test_draft("shared", "Shared"), first.id).await.unwrap();
    db.delete_source(first.id).await.unwrap();

    let second = db.add_source("https://second.example.com", None, None).await.unwrap();
    let outcome = db
        .upsert_post(&test_draft("shared", "Shared"), second.id)
        .await
        .unwrap();

    assert!(outcome.is_inserted());
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("gleaner_lifecycle_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("gleaner.db");
    let path_str = path.to_str().unwrap();

    {
        let db = Database::open(path_str).await.unwrap();
        let source = db.add_source("https://example.com", None, None).await.unwrap();
        db.upsert_post(&test_draft("p", "Persisted"), source.id).await.unwrap();
    }

    let db = Database::open(path_str).await.unwrap();
    assert_eq!(db.list_sources(false).await.unwrap().len(), 1);
    assert_eq!(db.count_posts().await.unwrap(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
