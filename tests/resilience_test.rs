mod helpers;

use std::sync::Arc;

use helpers::FailingSink;
use mdmemory::db;
use mdmemory::markdown::content_hash;
use mdmemory::memory::overview::load_overview_snapshot;
use mdmemory::memory::paths::EntityRef;
use mdmemory::memory::SnapshotUpdater;
use mdmemory::storage::local::LocalFsStorage;
use mdmemory::storage::StorageAdapter;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memory_updates", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn health_check_passes_on_valid_db() {
    let conn = helpers::test_db();
    helpers::enqueue(&conn, "u1", "s1");

    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.pending_updates, 1);
    assert_eq!(report.processed_updates, 0);
    assert_eq!(report.event_count, 0);
}

#[test]
fn busy_timeout_is_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);
}

#[tokio::test]
async fn failing_event_sink_never_blocks_the_write() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalFsStorage::new(tmp.path()));
    let updater = SnapshotUpdater::new(storage.clone(), Arc::new(FailingSink));

    let ensured = updater.ensure_user_overview_exists("u1").await.unwrap();
    assert!(ensured.created);

    let outcome = updater
        .append_change_log_with_event("u1", EntityRef::User, &ensured.path, "still written", None)
        .await
        .unwrap();
    assert!(outcome.appended);

    let text = storage.get_text(&ensured.path).await.unwrap().unwrap();
    assert!(text.contains("still written"));
    assert_eq!(outcome.after_hash, content_hash(&text));
}

#[tokio::test]
async fn overview_read_failure_degrades_to_none() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalFsStorage::new(tmp.path()));
    let updater = SnapshotUpdater::new(storage, Arc::new(FailingSink));

    // A directory where the overview file should be makes the read fail.
    std::fs::create_dir_all(tmp.path().join("users/u1/overview.md")).unwrap();

    assert!(load_overview_snapshot(&updater, "u1").await.is_none());
}
