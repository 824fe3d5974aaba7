//! Forward-only migrations for the queue and event log.
//!
//! `schema_meta.schema_version` starts at 1 (written by [`super::schema::init_schema`]);
//! each entry in [`STEPS`] lifts it by one inside its own transaction.

use rusqlite::{Connection, OptionalExtension};

/// Content hash scheme recorded for `memory_events.integrity_hash` and the
/// before/after hashes.
pub const HASH_FORMAT: &str = "sha256-canonical-v1";

struct Step {
    to: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[Step {
    to: 2,
    name: "hash format + processed index",
    sql: "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('hash_format', 'sha256-canonical-v1');
          CREATE INDEX IF NOT EXISTS idx_updates_processed ON memory_updates(user_id, processed_at);",
}];

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

/// Stored schema version; an unreadable value counts as 0.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(get_meta(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Hash scheme of the stored hashes, `None` before the v2 migration.
pub fn get_hash_format(conn: &Connection) -> rusqlite::Result<Option<String>> {
    get_meta(conn, "hash_format")
}

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current = get_schema_version(conn)?;
    tracing::debug!(schema_version = current, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    for step in STEPS.iter().filter(|s| s.to > current) {
        tracing::info!(to = step.to, name = step.name, "running migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(step.sql)?;
        tx.execute(
            "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
            [step.to.to_string()],
        )?;
        tx.commit()?;
    }

    Ok(())
}
