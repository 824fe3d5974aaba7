//! Pending-update queue over the `memory_updates` table.
//!
//! Two statements carry the concurrency guarantees:
//! - enqueue is `INSERT .. ON CONFLICT DO NOTHING` on `(user_id, kind, ref_id)`,
//!   so duplicate events collapse into one row;
//! - mark-processed is a per-row `UPDATE .. WHERE processed_at IS NULL`, so
//!   each row is claimed by at most one runner.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::{self, SharedConnection};

pub const MAX_REF_ID_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Session,
    CheckIn,
    Onboarding,
    InboxAction,
    Manual,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::CheckIn => "check_in",
            Self::Onboarding => "onboarding",
            Self::InboxAction => "inbox_action",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UpdateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "check_in" => Ok(Self::CheckIn),
            "onboarding" => Ok(Self::Onboarding),
            "inbox_action" => Ok(Self::InboxAction),
            "manual" => Ok(Self::Manual),
            _ => Err(format!(
                "unknown update kind: {s} (expected session, check_in, onboarding, inbox_action, manual)"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid memory update: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct EnqueueInput {
    pub user_id: String,
    pub kind: UpdateKind,
    pub ref_id: String,
    pub payload: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueResult {
    pub inserted: bool,
    pub id: String,
}

/// One unprocessed row.
#[derive(Debug, Clone, Serialize)]
pub struct PendingUpdate {
    pub id: String,
    pub user_id: String,
    pub kind: UpdateKind,
    pub ref_id: String,
    pub payload: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Stored row, processed or not.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateRecord {
    #[serde(flatten)]
    pub update: PendingUpdate,
    pub processed_at: Option<String>,
    pub processed_digest: Option<String>,
    pub processed_summary: Option<String>,
}

/// An item to mark processed, with an optional per-item summary.
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    pub id: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkProcessedResult {
    pub updated: usize,
    pub processed_at: String,
}

fn validate(input: &EnqueueInput) -> Result<(), QueueError> {
    if input.user_id.trim().is_empty() {
        return Err(QueueError::InvalidInput("user_id must not be empty".into()));
    }
    let ref_len = input.ref_id.chars().count();
    if ref_len == 0 || ref_len > MAX_REF_ID_LEN {
        return Err(QueueError::InvalidInput(format!(
            "ref_id must be 1..={MAX_REF_ID_LEN} characters (got {ref_len})"
        )));
    }
    for (name, value) in [("payload", &input.payload), ("metadata", &input.metadata)] {
        if let Some(v) = value {
            if !v.is_object() {
                return Err(QueueError::InvalidInput(format!("{name} must be a JSON object")));
            }
        }
    }
    Ok(())
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Insert the update unless `(user_id, kind, ref_id)` already exists.
///
/// Returns the id of the stored row in both cases.
pub fn enqueue_memory_update(conn: &Connection, input: &EnqueueInput) -> Result<EnqueueResult> {
    validate(input)?;

    let payload = input
        .payload
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    let mut metadata = input
        .metadata
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    if let Some(map) = metadata.as_object_mut() {
        map.insert("refId".into(), serde_json::Value::String(input.ref_id.clone()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let inserted = conn.execute(
        "INSERT INTO memory_updates (id, user_id, kind, ref_id, payload, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(user_id, kind, ref_id) DO NOTHING",
        params![
            id,
            input.user_id,
            input.kind.as_str(),
            input.ref_id,
            payload.to_string(),
            metadata.to_string(),
            now_timestamp(),
        ],
    )?;

    if inserted == 1 {
        tracing::debug!(user_id = %input.user_id, kind = %input.kind, ref_id = %input.ref_id, %id, "memory update enqueued");
        return Ok(EnqueueResult { inserted: true, id });
    }

    let existing: String = conn
        .query_row(
            "SELECT id FROM memory_updates WHERE user_id = ?1 AND kind = ?2 AND ref_id = ?3",
            params![input.user_id, input.kind.as_str(), input.ref_id],
            |row| row.get(0),
        )
        .context("duplicate update row vanished after conflict")?;

    tracing::debug!(user_id = %input.user_id, kind = %input.kind, ref_id = %input.ref_id, id = %existing, "memory update already queued");
    Ok(EnqueueResult {
        inserted: false,
        id: existing,
    })
}

type RawRow = (String, String, String, String, String, String, String);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_pending(raw: RawRow) -> Result<PendingUpdate> {
    let (id, user_id, kind, ref_id, payload, metadata, created_at) = raw;
    Ok(PendingUpdate {
        kind: kind.parse().map_err(anyhow::Error::msg)?,
        payload: serde_json::from_str(&payload)
            .with_context(|| format!("corrupt payload on update {id}"))?,
        metadata: serde_json::from_str(&metadata)
            .with_context(|| format!("corrupt metadata on update {id}"))?,
        id,
        user_id,
        ref_id,
        created_at,
    })
}

/// Unprocessed rows for a user, oldest first.
pub fn fetch_pending_updates(
    conn: &Connection,
    user_id: &str,
    limit: usize,
) -> Result<Vec<PendingUpdate>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, ref_id, payload, metadata, created_at FROM memory_updates \
         WHERE user_id = ?1 AND processed_at IS NULL \
         ORDER BY created_at ASC, id ASC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], read_raw)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(into_pending).collect()
}

/// Stamp each item processed if, and only if, it is still unprocessed.
///
/// Returns the number of rows this call actually claimed.
pub fn mark_updates_processed(
    conn: &mut Connection,
    user_id: &str,
    items: &[ProcessedItem],
    digest: &str,
) -> Result<MarkProcessedResult> {
    let processed_at = now_timestamp();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut updated = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE memory_updates SET processed_at = ?1, processed_digest = ?2, processed_summary = ?3 \
             WHERE id = ?4 AND user_id = ?5 AND processed_at IS NULL",
        )?;
        for item in items {
            updated += stmt.execute(params![
                processed_at,
                digest,
                item.summary,
                item.id,
                user_id
            ])?;
        }
    }
    tx.commit()?;

    if updated < items.len() {
        tracing::info!(
            user_id,
            requested = items.len(),
            updated,
            "some updates were already processed by another run"
        );
    }

    Ok(MarkProcessedResult {
        updated,
        processed_at,
    })
}

/// Distinct users with at least one unprocessed row.
pub fn list_users_with_pending_updates(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT user_id FROM memory_updates WHERE processed_at IS NULL ORDER BY user_id",
    )?;
    let users = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(users)
}

pub fn has_pending_updates(conn: &Connection, user_id: &str) -> Result<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM memory_updates WHERE user_id = ?1 AND processed_at IS NULL LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn get_update(conn: &Connection, id: &str) -> Result<Option<UpdateRecord>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, kind, ref_id, payload, metadata, created_at, \
             processed_at, processed_digest, processed_summary FROM memory_updates WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    read_raw(row)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            },
        )
        .optional()?;

    row.map(|(raw, processed_at, processed_digest, processed_summary)| {
        Ok(UpdateRecord {
            update: into_pending(raw)?,
            processed_at,
            processed_digest,
            processed_summary,
        })
    })
    .transpose()
}

/// Async handle over the queue for the runner and MCP tools.
#[derive(Clone)]
pub struct PendingQueue {
    db: SharedConnection,
}

impl PendingQueue {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, input: EnqueueInput) -> Result<EnqueueResult> {
        db::with_conn(&self.db, move |conn| enqueue_memory_update(conn, &input)).await
    }

    pub async fn fetch_pending(&self, user_id: &str, limit: usize) -> Result<Vec<PendingUpdate>> {
        let user_id = user_id.to_string();
        db::with_conn(&self.db, move |conn| fetch_pending_updates(conn, &user_id, limit)).await
    }

    pub async fn mark_processed(
        &self,
        user_id: &str,
        items: Vec<ProcessedItem>,
        digest: &str,
    ) -> Result<MarkProcessedResult> {
        let user_id = user_id.to_string();
        let digest = digest.to_string();
        db::with_conn(&self.db, move |conn| {
            mark_updates_processed(conn, &user_id, &items, &digest)
        })
        .await
    }

    pub async fn users_with_pending(&self) -> Result<Vec<String>> {
        db::with_conn(&self.db, |conn| list_users_with_pending_updates(conn)).await
    }

    pub async fn has_pending(&self, user_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        db::with_conn(&self.db, move |conn| has_pending_updates(conn, &user_id)).await
    }
}
