//! Digest shape, generator contract, and runner outcomes.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::memory::queue::PendingUpdate;

/// Follow-up flag the generator may attach to a digest item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FollowUp {
    None,
    CheckIn,
    Investigate,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DigestItem {
    /// ID of the update that was summarized.
    pub id: String,
    /// Categorization of the update for quick reference.
    #[serde(default)]
    pub kind: String,
    /// Compact explanation of the update.
    #[serde(default)]
    pub summary: String,
    /// Whether additional follow-up is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
}

/// Structured answer requested from the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDigest {
    /// One or two sentences to append to the user change log.
    pub digest: String,
    /// Summaries for each update that was processed.
    #[serde(default)]
    pub items: Vec<DigestItem>,
    /// IDs of updates that could not be summarized and still need attention.
    #[serde(default)]
    pub leftover_ids: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("summarizer unavailable: {0}")]
    Unavailable(String),
    #[error("summarizer credentials missing: {0}")]
    MissingCredentials(String),
    #[error("summarizer model error: {0}")]
    Model(String),
    #[error("summary generation failed: {0}")]
    Generation(String),
}

impl GeneratorError {
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            Self::Unavailable(_) => SkipReason::SummarizerMissing,
            Self::MissingCredentials(_) => SkipReason::OpenrouterMissing,
            Self::Model(_) => SkipReason::ModelError,
            Self::Generation(_) => SkipReason::GenerationError,
        }
    }
}

/// Why a run ended without processing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoUpdates,
    SummarizerMissing,
    ModelError,
    OpenrouterMissing,
    GenerationError,
    NoDigest,
    NoMatchingUpdates,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoUpdates => "no-updates",
            Self::SummarizerMissing => "summarizer-missing",
            Self::ModelError => "model-error",
            Self::OpenrouterMissing => "openrouter-missing",
            Self::GenerationError => "generation-error",
            Self::NoDigest => "no-digest",
            Self::NoMatchingUpdates => "no-matching-updates",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one per-user run.
#[derive(Debug, Clone, Serialize)]
pub struct SummarizerResult {
    pub user_id: String,
    pub processed_ids: Vec<String>,
    pub digest: Option<String>,
    pub item_count: usize,
    /// Rows this run actually stamped; lower than `item_count` when another run got there first.
    pub claimed: usize,
    pub skipped: bool,
    pub reason: Option<SkipReason>,
    pub raw: Option<UpdateDigest>,
}

impl SummarizerResult {
    pub fn skip(user_id: &str, reason: SkipReason) -> Self {
        Self {
            user_id: user_id.to_string(),
            processed_ids: Vec::new(),
            digest: None,
            item_count: 0,
            claimed: 0,
            skipped: true,
            reason: Some(reason),
            raw: None,
        }
    }
}

/// What the runner hands to a generator.
///
/// `pending` is the only data source the generator may answer the
/// `update_sync` tool from.
#[derive(Debug, Clone)]
pub struct SummarizeRequest {
    pub user_id: String,
    pub prompt: String,
    pub pending: Vec<PendingUpdate>,
}

/// External digest generator.
#[async_trait]
pub trait UpdateSummarizer: Send + Sync {
    async fn resolve_model(&self) -> Result<String, GeneratorError>;

    /// `Ok(None)` means the generator produced nothing usable.
    async fn summarize(
        &self,
        model: &str,
        request: &SummarizeRequest,
    ) -> Result<Option<UpdateDigest>, GeneratorError>;
}

/// JSON returned for an `update_sync` tool call.
pub fn pending_tool_payload(pending: &[PendingUpdate], limit: usize) -> serde_json::Value {
    let items: Vec<serde_json::Value> = pending
        .iter()
        .take(limit)
        .map(|u| {
            serde_json::json!({
                "id": u.id,
                "kind": u.kind.as_str(),
                "createdAt": u.created_at,
                "payload": u.payload,
                "metadata": u.metadata,
            })
        })
        .collect();
    serde_json::Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::queue::UpdateKind;

    #[test]
    fn digest_accepts_camel_case_and_missing_fields() {
        let raw = r#"{"digest":"ok","items":[{"id":"a","followUp":"check-in"}]}"#;
        let digest: UpdateDigest = serde_json::from_str(raw).unwrap();
        assert_eq!(digest.items[0].follow_up, Some(FollowUp::CheckIn));
        assert!(digest.leftover_ids.is_empty());
        assert_eq!(digest.items[0].summary, "");
    }

    #[test]
    fn error_kinds_map_to_reasons() {
        assert_eq!(
            GeneratorError::MissingCredentials("k".into()).skip_reason().as_str(),
            "openrouter-missing"
        );
        assert_eq!(
            GeneratorError::Generation("x".into()).skip_reason(),
            SkipReason::GenerationError
        );
        assert_eq!(
            serde_json::to_value(SkipReason::NoMatchingUpdates).unwrap(),
            "no-matching-updates"
        );
    }

    #[test]
    fn tool_payload_is_limited() {
        let pending: Vec<PendingUpdate> = (0..3)
            .map(|i| PendingUpdate {
                id: format!("id{i}"),
                user_id: "u1".into(),
                kind: UpdateKind::CheckIn,
                ref_id: format!("r{i}"),
                payload: serde_json::json!({}),
                metadata: serde_json::json!({}),
                created_at: "2026-01-01T00:00:00Z".into(),
            })
            .collect();
        let payload = pending_tool_payload(&pending, 2);
        assert_eq!(payload.as_array().unwrap().len(), 2);
        assert_eq!(payload[0]["kind"], "check_in");
    }
}
