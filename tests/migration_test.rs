mod helpers;

use mdmemory::db::migrations::{
    get_hash_format, get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION,
};

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migration_records_hash_format() {
    let conn = helpers::test_db();
    assert_eq!(
        get_hash_format(&conn).unwrap(),
        Some("sha256-canonical-v1".to_string())
    );
}

#[test]
fn migrations_are_idempotent() {
    let conn = helpers::test_db();
    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn manual_v1_db_upgrades_correctly() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    mdmemory::db::schema::init_schema(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), 1);
    assert!(get_hash_format(&conn).unwrap().is_none());

    run_migrations(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    let index_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_updates_processed'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(index_count, 1);
}
