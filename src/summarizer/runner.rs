//! Folds a user's pending updates into one change-log line.
//!
//! Each run ends in exactly one [`SkipReason`] or a success. Nothing is
//! written before the generator's answer has been validated against the
//! pending set, and generator failures never touch the queue.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::types::{SkipReason, SummarizeRequest, SummarizerResult, UpdateDigest, UpdateSummarizer};
use crate::markdown::content_hash;
use crate::markdown::canonical::HASH_PREFIX;
use crate::memory::paths::EntityRef;
use crate::memory::queue::{PendingQueue, PendingUpdate, ProcessedItem};
use crate::memory::updater::SnapshotUpdater;

const FINGERPRINT_LEN: usize = 16;

/// Instruction sent with every run. The generator must fetch the items
/// itself through `update_sync` before answering.
pub fn build_prompt(user_id: &str) -> String {
    format!(
        "User {user_id} needs their pending memory updates summarized.\n\
         Call the update_sync tool with {{\"userId\":\"{user_id}\"}} to retrieve outstanding items before writing anything.\n\
         Return JSON matching the provided schema only."
    )
}

/// Digest items whose id is actually pending, first occurrence wins.
///
/// Ids the generator made up are dropped.
pub fn select_processed_updates(
    pending: &[PendingUpdate],
    digest: &UpdateDigest,
) -> Vec<ProcessedItem> {
    let pending_ids: HashSet<&str> = pending.iter().map(|u| u.id.as_str()).collect();
    let mut seen = HashSet::new();

    digest
        .items
        .iter()
        .filter(|item| pending_ids.contains(item.id.as_str()))
        .filter(|item| seen.insert(item.id.clone()))
        .map(|item| {
            let summary = item.summary.trim();
            ProcessedItem {
                id: item.id.clone(),
                summary: (!summary.is_empty()).then(|| summary.to_string()),
            }
        })
        .collect()
}

/// Short fingerprint of a digest line and the rows it covers.
///
/// Order of `ids` does not matter.
pub fn digest_fingerprint(digest: &str, ids: &[String]) -> String {
    let mut ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();
    let hash = content_hash(&format!("{}\n{}", digest.trim(), ids.join(",")));
    let hex = hash.strip_prefix(HASH_PREFIX).unwrap_or(&hash);
    hex[..FINGERPRINT_LEN.min(hex.len())].to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct UserFailure {
    pub user_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<SummarizerResult>,
    pub failures: Vec<UserFailure>,
}

impl BatchReport {
    pub fn processed_total(&self) -> usize {
        self.results.iter().map(|r| r.item_count).sum()
    }
}

#[derive(Clone)]
pub struct UpdateRunner {
    queue: PendingQueue,
    updater: SnapshotUpdater,
    summarizer: Option<Arc<dyn UpdateSummarizer>>,
    batch_limit: usize,
}

impl UpdateRunner {
    pub fn new(
        queue: PendingQueue,
        updater: SnapshotUpdater,
        summarizer: Option<Arc<dyn UpdateSummarizer>>,
        batch_limit: usize,
    ) -> Self {
        Self {
            queue,
            updater,
            summarizer,
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Run one summarization pass for a user.
    ///
    /// `Err` is reserved for storage and database failures; every generator
    /// outcome is reported through the result.
    pub async fn summarize_pending_updates_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<SummarizerResult> {
        let limit = limit.unwrap_or(self.batch_limit).max(1);
        let pending = self.queue.fetch_pending(user_id, limit).await?;
        if pending.is_empty() {
            return Ok(SummarizerResult::skip(user_id, SkipReason::NoUpdates));
        }

        let Some(summarizer) = self.summarizer.as_ref() else {
            tracing::warn!(user_id, "no summarizer configured");
            return Ok(SummarizerResult::skip(user_id, SkipReason::SummarizerMissing));
        };

        let model = match summarizer.resolve_model().await {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "summarizer model unavailable");
                return Ok(SummarizerResult::skip(user_id, e.skip_reason()));
            }
        };

        let request = SummarizeRequest {
            user_id: user_id.to_string(),
            prompt: build_prompt(user_id),
            pending,
        };
        let digest = match summarizer.summarize(&model, &request).await {
            Ok(Some(digest)) => digest,
            Ok(None) => {
                tracing::info!(user_id, %model, "summarizer returned no digest");
                return Ok(SummarizerResult::skip(user_id, SkipReason::NoDigest));
            }
            Err(e) => {
                tracing::warn!(user_id, %model, error = %e, "summary generation failed");
                return Ok(SummarizerResult::skip(user_id, e.skip_reason()));
            }
        };

        let processed = select_processed_updates(&request.pending, &digest);
        if processed.is_empty() {
            tracing::warn!(
                user_id,
                claimed = digest.items.len(),
                "digest matched none of the pending updates"
            );
            let mut result = SummarizerResult::skip(user_id, SkipReason::NoMatchingUpdates);
            result.digest = Some(digest.digest.clone());
            result.raw = Some(digest);
            return Ok(result);
        }

        let trimmed = digest.digest.trim().to_string();
        let processed_ids: Vec<String> = processed.iter().map(|p| p.id.clone()).collect();
        if !trimmed.is_empty() {
            let overview = self.updater.ensure_user_overview_exists(user_id).await?;
            let fingerprint = digest_fingerprint(&trimmed, &processed_ids);
            self.updater
                .append_change_log_with_event(
                    user_id,
                    EntityRef::User,
                    &overview.path,
                    &trimmed,
                    Some(&fingerprint),
                )
                .await?;
        }

        let marked = self
            .queue
            .mark_processed(user_id, processed, &trimmed)
            .await?;

        tracing::info!(
            user_id,
            items = processed_ids.len(),
            claimed = marked.updated,
            leftover = digest.leftover_ids.len(),
            "pending updates summarized"
        );

        Ok(SummarizerResult {
            user_id: user_id.to_string(),
            item_count: processed_ids.len(),
            processed_ids,
            digest: (!trimmed.is_empty()).then_some(trimmed),
            claimed: marked.updated,
            skipped: false,
            reason: None,
            raw: Some(digest),
        })
    }

    /// Summarize every user with pending rows; one user's failure does not
    /// stop the batch.
    pub async fn summarize_all_pending(&self, limit: Option<usize>) -> Result<BatchReport> {
        let users = self.queue.users_with_pending().await?;
        let mut report = BatchReport::default();

        for user_id in users {
            match self.summarize_pending_updates_for_user(&user_id, limit).await {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "summarizer run failed");
                    report.failures.push(UserFailure {
                        user_id,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::queue::UpdateKind;
    use crate::summarizer::types::DigestItem;

    fn pending(ids: &[&str]) -> Vec<PendingUpdate> {
        ids.iter()
            .map(|id| PendingUpdate {
                id: id.to_string(),
                user_id: "u1".into(),
                kind: UpdateKind::Session,
                ref_id: format!("ref-{id}"),
                payload: serde_json::json!({}),
                metadata: serde_json::json!({}),
                created_at: "2026-01-01T00:00:00Z".into(),
            })
            .collect()
    }

    fn item(id: &str, summary: &str) -> DigestItem {
        DigestItem {
            id: id.into(),
            kind: "session".into(),
            summary: summary.into(),
            follow_up: None,
        }
    }

    #[test]
    fn selection_drops_invented_and_duplicate_ids() {
        let digest = UpdateDigest {
            digest: "d".into(),
            items: vec![item("a", "first"), item("x", "made up"), item("a", "again"), item("b", " ")],
            leftover_ids: vec![],
        };
        let selected = select_processed_updates(&pending(&["a", "b", "c"]), &digest);
        let ids: Vec<&str> = selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(selected[0].summary.as_deref(), Some("first"));
        assert_eq!(selected[1].summary, None);
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let ids = vec!["b".to_string(), "a".to_string()];
        let a = digest_fingerprint("Three sessions", &ids);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert_eq!(a, digest_fingerprint("Three sessions\n", &["a".into(), "b".into()]));
        assert_ne!(a, digest_fingerprint("Two sessions", &ids));
        assert_ne!(a, digest_fingerprint("Three sessions", &["a".into(), "c".into()]));
    }

    #[test]
    fn prompt_names_the_tool() {
        let prompt = build_prompt("u1");
        assert!(prompt.contains("update_sync"));
        assert!(prompt.contains(r#"{"userId":"u1"}"#));
    }
}
