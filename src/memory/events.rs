//! Mutation audit log.
//!
//! Every committed markdown mutation produces one immutable [`MutationEvent`].
//! Logging is best-effort: [`log_markdown_mutation`] never fails its caller,
//! and a sink error is reported through `tracing` only.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::paths::{EntityRef, EntityType};
use crate::db::{self, SharedConnection};
use crate::markdown::{canonicalize_json, content_hash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    AppendSection,
    ReplaceSection,
}

impl MutationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppendSection => "append_section",
            Self::ReplaceSection => "replace_section",
        }
    }
}

impl std::str::FromStr for MutationOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append_section" => Ok(Self::AppendSection),
            "replace_section" => Ok(Self::ReplaceSection),
            _ => Err(format!("unknown mutation op: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Committed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "committed" => Ok(Self::Committed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown event status: {s}")),
        }
    }
}

/// How the document changed. `Create` is logged as a whole-document replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    Append,
    Replace,
    Create,
}

impl MutationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
            Self::Create => "create",
        }
    }

    fn op(&self) -> MutationOp {
        match self {
            Self::Append => MutationOp::AppendSection,
            Self::Replace | Self::Create => MutationOp::ReplaceSection,
        }
    }
}

/// One row of the append-only `memory_events` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    pub event_id: String,
    pub user_id: String,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub operation: MutationOp,
    pub file_path: String,
    pub anchor: Option<String>,
    pub rationale: String,
    pub before_hash: Option<String>,
    pub after_hash: String,
    pub evidence_refs: Vec<serde_json::Value>,
    pub lint_warnings: Vec<String>,
    /// Hash of the canonical change text the event was derived from.
    pub integrity_hash: String,
    pub status: EventStatus,
    pub created_at: String,
}

/// Input to [`log_markdown_mutation`].
#[derive(Debug, Clone)]
pub struct MarkdownMutation {
    pub user_id: String,
    pub entity: EntityRef,
    pub file_path: String,
    pub anchor: Option<String>,
    pub mode: MutationMode,
    /// The text that was appended, substituted, or created.
    pub text: String,
    pub before_hash: Option<String>,
    pub after_hash: String,
    pub warnings: Vec<String>,
    pub rationale: Option<String>,
}

impl MarkdownMutation {
    pub fn into_event(self) -> MutationEvent {
        let rationale = self.rationale.unwrap_or_else(|| {
            format!("markdown {} {}", self.mode.as_str(), self.anchor.as_deref().unwrap_or(""))
                .trim()
                .to_string()
        });
        MutationEvent {
            event_id: uuid::Uuid::now_v7().to_string(),
            entity_type: self.entity.entity_type(),
            entity_id: self.entity.entity_id(&self.user_id),
            user_id: self.user_id,
            operation: self.mode.op(),
            file_path: self.file_path,
            anchor: self.anchor,
            rationale,
            before_hash: self.before_hash,
            after_hash: self.after_hash,
            evidence_refs: Vec::new(),
            lint_warnings: self.warnings,
            integrity_hash: content_hash(&self.text),
            status: EventStatus::Committed,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only event store.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn log_event(&self, event: &MutationEvent) -> Result<()>;
}

/// Record a mutation. Sink failures are logged and swallowed.
pub async fn log_markdown_mutation(sink: &dyn EventSink, mutation: MarkdownMutation) {
    let event = mutation.into_event();
    if let Err(e) = sink.log_event(&event).await {
        tracing::error!(
            error = %e,
            file_path = %event.file_path,
            anchor = ?event.anchor,
            op = event.operation.as_str(),
            "mutation event logging failed"
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn log_event(&self, _event: &MutationEvent) -> Result<()> {
        Ok(())
    }
}

/// [`EventSink`] backed by the `memory_events` table.
#[derive(Clone)]
pub struct SqliteEventSink {
    db: SharedConnection,
}

impl SqliteEventSink {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    /// Async [`recent_events`].
    pub async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<MutationEvent>> {
        let user_id = user_id.to_string();
        db::with_conn(&self.db, move |conn| recent_events(conn, &user_id, limit)).await
    }
}

#[async_trait]
impl EventSink for SqliteEventSink {
    async fn log_event(&self, event: &MutationEvent) -> Result<()> {
        let event = event.clone();
        db::with_conn(&self.db, move |conn| insert_event(conn, &event)).await
    }
}

/// Insert one event row.
pub fn insert_event(conn: &Connection, event: &MutationEvent) -> Result<()> {
    let evidence = canonicalize_json(&serde_json::Value::from(event.evidence_refs.clone()));
    let lint = canonicalize_json(&serde_json::json!({ "warnings": event.lint_warnings }));
    conn.execute(
        "INSERT INTO memory_events (event_id, user_id, entity_type, entity_id, op, section_anchor, \
         file_path, rationale, before_hash, after_hash, evidence_refs, lint, integrity_hash, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            event.event_id,
            event.user_id,
            event.entity_type.as_str(),
            event.entity_id,
            event.operation.as_str(),
            event.anchor,
            event.file_path,
            event.rationale,
            event.before_hash,
            event.after_hash,
            evidence,
            lint,
            event.integrity_hash,
            event.status.as_str(),
            event.created_at,
        ],
    )?;
    Ok(())
}

/// Most recent events for a user, newest first.
pub fn recent_events(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<MutationEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, user_id, entity_type, entity_id, op, section_anchor, file_path, rationale, \
         before_hash, after_hash, evidence_refs, lint, integrity_hash, status, created_at \
         FROM memory_events WHERE user_id = ?1 ORDER BY created_at DESC, event_id DESC LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, String>(12)?,
                row.get::<_, String>(13)?,
                row.get::<_, String>(14)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|r| {
            let lint: serde_json::Value = serde_json::from_str(&r.11)?;
            let lint_warnings = lint
                .get("warnings")
                .and_then(|w| w.as_array())
                .map(|w| w.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            Ok(MutationEvent {
                event_id: r.0,
                user_id: r.1,
                entity_type: r.2.parse().map_err(anyhow::Error::msg)?,
                entity_id: r.3,
                operation: r.4.parse().map_err(anyhow::Error::msg)?,
                anchor: r.5,
                file_path: r.6,
                rationale: r.7.unwrap_or_default(),
                before_hash: r.8,
                after_hash: r.9,
                evidence_refs: serde_json::from_str(&r.10)?,
                lint_warnings,
                integrity_hash: r.12,
                status: r.13.parse().map_err(anyhow::Error::msg)?,
                created_at: r.14,
            })
        })
        .collect()
}
