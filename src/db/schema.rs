//! SQL DDL for the relational side of the memory store.
//!
//! Defines the `memory_updates` pending-update queue, the append-only
//! `memory_events` mutation log, and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Pending-update queue; (user_id, kind, ref_id) identifies one logical event
CREATE TABLE IF NOT EXISTS memory_updates (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('session','check_in','onboarding','inbox_action','manual')),
    ref_id TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    processed_at TEXT,
    processed_digest TEXT,
    processed_summary TEXT,
    UNIQUE(user_id, kind, ref_id)
);

CREATE INDEX IF NOT EXISTS idx_updates_pending ON memory_updates(user_id, processed_at, created_at);

-- Markdown mutation audit log (append-only)
CREATE TABLE IF NOT EXISTS memory_events (
    event_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    entity_type TEXT NOT NULL CHECK(entity_type IN ('user','part','relationship','note')),
    entity_id TEXT,
    op TEXT NOT NULL CHECK(op IN ('append_section','replace_section')),
    section_anchor TEXT,
    file_path TEXT NOT NULL,
    rationale TEXT,
    before_hash TEXT,
    after_hash TEXT NOT NULL,
    evidence_refs TEXT NOT NULL DEFAULT '[]',
    lint TEXT NOT NULL DEFAULT '{}',
    integrity_hash TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'committed' CHECK(status IN ('pending','committed','failed')),
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_user ON memory_events(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_events_entity ON memory_events(entity_type, entity_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
