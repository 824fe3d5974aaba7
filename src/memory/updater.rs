//! Snapshot and profile updater.
//!
//! Creates overview/part/relationship documents on first reference and
//! appends change-log lines, logging one mutation event per write.
//! `ensure_*` is check-then-put: two concurrent callers may both create the
//! same document, and the last write wins.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use super::events::{log_markdown_mutation, EventSink, MarkdownMutation, MutationMode};
use super::paths::{part_profile_path, relationship_profile_path, user_overview_path, EntityRef};
use crate::markdown::editor::{write_markdown_section, WriteOutcome};
use crate::markdown::templates::{
    build_part_profile_markdown, build_relationship_profile_markdown, build_user_overview_markdown,
    change_log_line, fingerprint_tag, PartSeed, RelationshipSeed, ANCHOR_CHANGE_LOG,
};
use crate::markdown::{content_hash, read_section_map, SectionChange};
use crate::storage::{StorageAdapter, MARKDOWN_CONTENT_TYPE};

#[derive(Debug, Clone, Serialize)]
pub struct EnsureResult {
    pub path: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendOutcome {
    pub path: String,
    pub appended: bool,
    pub before_hash: String,
    pub after_hash: String,
    pub warnings: Vec<String>,
}

/// Which document a projection should sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionTarget {
    Part { part_id: String },
    Relationship { rel_id: String },
}

/// Syncs a document's declared state into a secondary store.
#[async_trait]
pub trait ProfileProjection: Send + Sync {
    async fn project(&self, user_id: &str, target: &ProjectionTarget, path: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProjection;

#[async_trait]
impl ProfileProjection for NoopProjection {
    async fn project(&self, _user_id: &str, _target: &ProjectionTarget, _path: &str) -> Result<()> {
        Ok(())
    }
}

/// Part fields carried by the part hooks.
#[derive(Debug, Clone)]
pub struct PartInfo {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub category: Option<String>,
}

/// Relationship fields carried by [`SnapshotUpdater::on_relationship_logged`].
#[derive(Debug, Clone)]
pub struct RelationshipInfo {
    pub id: String,
    pub rel_type: String,
    pub part_ids: Vec<String>,
}

#[derive(Clone)]
pub struct SnapshotUpdater {
    storage: Arc<dyn StorageAdapter>,
    events: Arc<dyn EventSink>,
    projection: Arc<dyn ProfileProjection>,
}

impl SnapshotUpdater {
    pub fn new(storage: Arc<dyn StorageAdapter>, events: Arc<dyn EventSink>) -> Self {
        Self {
            storage,
            events,
            projection: Arc::new(NoopProjection),
        }
    }

    pub fn with_projection(mut self, projection: Arc<dyn ProfileProjection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn storage(&self) -> &dyn StorageAdapter {
        self.storage.as_ref()
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    async fn ensure_document(
        &self,
        user_id: &str,
        entity: EntityRef,
        path: String,
        build: impl FnOnce() -> String,
    ) -> Result<EnsureResult> {
        if self.storage.exists(&path).await? {
            return Ok(EnsureResult {
                path,
                created: false,
            });
        }

        let content = build();
        self.storage
            .put_text(&path, &content, MARKDOWN_CONTENT_TYPE)
            .await?;
        tracing::info!(user_id, %path, entity = %entity.entity_type(), "snapshot created");

        log_markdown_mutation(
            self.events.as_ref(),
            MarkdownMutation {
                user_id: user_id.to_string(),
                entity,
                file_path: path.clone(),
                anchor: None,
                mode: MutationMode::Create,
                after_hash: content_hash(&content),
                text: content,
                before_hash: None,
                warnings: Vec::new(),
                rationale: None,
            },
        )
        .await;

        Ok(EnsureResult {
            path,
            created: true,
        })
    }

    pub async fn ensure_user_overview_exists(&self, user_id: &str) -> Result<EnsureResult> {
        self.ensure_document(user_id, EntityRef::User, user_overview_path(user_id), || {
            build_user_overview_markdown(user_id, Utc::now())
        })
        .await
    }

    pub async fn ensure_part_profile_exists(&self, seed: &PartSeed) -> Result<EnsureResult> {
        self.ensure_document(
            &seed.user_id,
            EntityRef::Part(seed.part_id.clone()),
            part_profile_path(&seed.user_id, &seed.part_id),
            || build_part_profile_markdown(seed, Utc::now()),
        )
        .await
    }

    pub async fn ensure_relationship_profile_exists(
        &self,
        seed: &RelationshipSeed,
    ) -> Result<EnsureResult> {
        self.ensure_document(
            &seed.user_id,
            EntityRef::Relationship(seed.rel_id.clone()),
            relationship_profile_path(&seed.user_id, &seed.rel_id),
            || build_relationship_profile_markdown(seed, Utc::now()),
        )
        .await
    }

    /// Append one timestamped line to the document's change log.
    ///
    /// With a fingerprint, the append is skipped (no write, no event) when the
    /// change log already carries `[fp:<fingerprint>]`.
    pub async fn append_change_log_with_event(
        &self,
        user_id: &str,
        entity: EntityRef,
        path: &str,
        message: &str,
        fingerprint: Option<&str>,
    ) -> Result<AppendOutcome> {
        if let Some(fp) = fingerprint {
            if let Some(text) = self.storage.get_text(path).await? {
                let sections = read_section_map(&text);
                let tag = fingerprint_tag(fp);
                if sections
                    .get(ANCHOR_CHANGE_LOG)
                    .is_some_and(|s| s.text.contains(&tag))
                {
                    tracing::debug!(user_id, path, fingerprint = fp, "change log entry already present");
                    let hash = content_hash(&text);
                    return Ok(AppendOutcome {
                        path: path.to_string(),
                        appended: false,
                        before_hash: hash.clone(),
                        after_hash: hash,
                        warnings: Vec::new(),
                    });
                }
            }
        }

        let line = change_log_line(Utc::now(), message, fingerprint);
        let change = SectionChange::Append(line);
        let outcome = self
            .write_section_with_event(user_id, entity, path, ANCHOR_CHANGE_LOG, &change, None, None)
            .await?;

        match outcome {
            WriteOutcome::Written(edit) => Ok(AppendOutcome {
                path: edit.path,
                appended: true,
                before_hash: edit.before_hash,
                after_hash: edit.after_hash,
                warnings: edit.warnings,
            }),
            WriteOutcome::Conflict { current_hash } => {
                anyhow::bail!("unexpected conflict appending change log (current {current_hash})")
            }
        }
    }

    /// Patch a section (optionally hash-guarded) and log the mutation on success.
    #[allow(clippy::too_many_arguments)]
    pub async fn write_section_with_event(
        &self,
        user_id: &str,
        entity: EntityRef,
        path: &str,
        anchor: &str,
        change: &SectionChange,
        expected_before_hash: Option<&str>,
        rationale: Option<String>,
    ) -> Result<WriteOutcome> {
        let outcome =
            write_markdown_section(self.storage.as_ref(), path, anchor, change, expected_before_hash)
                .await?;

        if let WriteOutcome::Written(edit) = &outcome {
            let mode = match change {
                SectionChange::Append(_) => MutationMode::Append,
                SectionChange::Replace(_) => MutationMode::Replace,
            };
            log_markdown_mutation(
                self.events.as_ref(),
                MarkdownMutation {
                    user_id: user_id.to_string(),
                    entity,
                    file_path: path.to_string(),
                    anchor: Some(anchor.to_string()),
                    mode,
                    text: change.text().to_string(),
                    before_hash: Some(edit.before_hash.clone()),
                    after_hash: edit.after_hash.clone(),
                    warnings: edit.warnings.clone(),
                    rationale,
                },
            )
            .await;
        }

        Ok(outcome)
    }

    async fn project(&self, user_id: &str, target: ProjectionTarget, path: &str) {
        if let Err(e) = self.projection.project(user_id, &target, path).await {
            tracing::warn!(user_id, path, ?target, error = %e, "profile projection failed");
        }
    }

    pub async fn on_part_created(&self, user_id: &str, part: &PartInfo) -> Result<AppendOutcome> {
        let seed = PartSeed {
            user_id: user_id.to_string(),
            part_id: part.id.clone(),
            name: part.name.clone(),
            status: part.status.clone().unwrap_or_else(|| "emerging".into()),
            category: part.category.clone().unwrap_or_else(|| "unknown".into()),
        };
        let ensured = self.ensure_part_profile_exists(&seed).await?;
        let outcome = self
            .append_change_log_with_event(
                user_id,
                EntityRef::Part(part.id.clone()),
                &ensured.path,
                &format!("Part created: {}", part.name),
                None,
            )
            .await?;
        self.project(
            user_id,
            ProjectionTarget::Part {
                part_id: part.id.clone(),
            },
            &ensured.path,
        )
        .await;
        Ok(outcome)
    }

    pub async fn on_part_updated(
        &self,
        user_id: &str,
        part: &PartInfo,
        change: &str,
    ) -> Result<AppendOutcome> {
        let seed = PartSeed {
            user_id: user_id.to_string(),
            part_id: part.id.clone(),
            name: part.name.clone(),
            status: part.status.clone().unwrap_or_else(|| "unknown".into()),
            category: part.category.clone().unwrap_or_else(|| "unknown".into()),
        };
        let ensured = self.ensure_part_profile_exists(&seed).await?;
        let outcome = self
            .append_change_log_with_event(
                user_id,
                EntityRef::Part(part.id.clone()),
                &ensured.path,
                &format!("Part updated: {change}"),
                None,
            )
            .await?;
        self.project(
            user_id,
            ProjectionTarget::Part {
                part_id: part.id.clone(),
            },
            &ensured.path,
        )
        .await;
        Ok(outcome)
    }

    pub async fn on_relationship_logged(
        &self,
        user_id: &str,
        rel: &RelationshipInfo,
        note: Option<&str>,
    ) -> Result<AppendOutcome> {
        let seed = RelationshipSeed {
            user_id: user_id.to_string(),
            rel_id: rel.id.clone(),
            part_ids: rel.part_ids.clone(),
            rel_type: rel.rel_type.clone(),
        };
        let ensured = self.ensure_relationship_profile_exists(&seed).await?;
        let message = match note.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => format!("Relationship logged ({}): {n}", rel.rel_type),
            None => format!("Relationship logged ({})", rel.rel_type),
        };
        let outcome = self
            .append_change_log_with_event(
                user_id,
                EntityRef::Relationship(rel.id.clone()),
                &ensured.path,
                &message,
                None,
            )
            .await?;
        self.project(
            user_id,
            ProjectionTarget::Relationship {
                rel_id: rel.id.clone(),
            },
            &ensured.path,
        )
        .await;
        Ok(outcome)
    }
}
