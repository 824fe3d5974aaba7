//! Read-side projection of the user overview and profile documents.
//!
//! Overview context is advisory: [`load_overview_snapshot`] returns `None`
//! on any failure instead of erroring.

use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use super::paths::{part_profile_path, relationship_profile_path, user_overview_path};
use super::updater::SnapshotUpdater;
use crate::markdown::templates::{ANCHOR_CHANGE_LOG, ANCHOR_CURRENT_FOCUS, ANCHOR_IDENTITY};
use crate::markdown::{read_section_map, SectionMap};

/// Anchors included in an overview snapshot, in output order.
pub const OVERVIEW_ANCHORS: [&str; 3] = [ANCHOR_IDENTITY, ANCHOR_CURRENT_FOCUS, ANCHOR_CHANGE_LOG];

pub const MAX_CHANGE_LOG_ENTRIES: usize = 25;

const UNAVAILABLE: &str = "Unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewFragment {
    pub anchor: String,
    pub heading: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewSnapshot {
    /// Whether this call created the overview document.
    pub created: bool,
    pub fragments: Vec<OverviewFragment>,
}

#[derive(Debug, Clone, Copy)]
enum SnapshotKind {
    Overview,
    PartProfile,
    RelationshipProfile,
}

impl SnapshotKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::PartProfile => "part_profile",
            Self::RelationshipProfile => "relationship_profile",
        }
    }
}

fn record_usage(kind: SnapshotKind, status: &str, started: Instant) {
    tracing::debug!(
        target: "snapshot_usage",
        kind = kind.as_str(),
        status,
        latency_ms = started.elapsed().as_millis() as u64,
        "snapshot read"
    );
}

async fn read_sections(
    updater: &SnapshotUpdater,
    kind: SnapshotKind,
    path: &str,
) -> Result<Option<SectionMap>> {
    let started = Instant::now();
    match updater.storage().get_text(path).await {
        Ok(Some(text)) => {
            record_usage(kind, "hit", started);
            Ok(Some(read_section_map(&text)))
        }
        Ok(None) => {
            record_usage(kind, "miss", started);
            Ok(None)
        }
        Err(e) => {
            record_usage(kind, "error", started);
            Err(e)
        }
    }
}

fn extract_fragments(sections: &SectionMap) -> Vec<OverviewFragment> {
    OVERVIEW_ANCHORS
        .iter()
        .filter_map(|anchor| {
            sections.get(*anchor).map(|s| OverviewFragment {
                anchor: anchor.to_string(),
                heading: s.heading.clone(),
                text: s.text.clone(),
            })
        })
        .collect()
}

async fn try_load(updater: &SnapshotUpdater, user_id: &str) -> Result<OverviewSnapshot> {
    let path = user_overview_path(user_id);
    let mut created = false;
    let mut sections = read_sections(updater, SnapshotKind::Overview, &path).await?;

    if sections.is_none() {
        created = updater.ensure_user_overview_exists(user_id).await?.created;
        sections = read_sections(updater, SnapshotKind::Overview, &path).await?;
    }

    Ok(OverviewSnapshot {
        created,
        fragments: sections.as_ref().map(extract_fragments).unwrap_or_default(),
    })
}

/// Identity, current focus and change log of a user's overview, creating the
/// overview on first use.
pub async fn load_overview_snapshot(
    updater: &SnapshotUpdater,
    user_id: &str,
) -> Option<OverviewSnapshot> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return None;
    }

    match try_load(updater, user_id).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::error!(user_id, error = %e, "failed to load overview snapshot");
            None
        }
    }
}

/// Render fragments as `### heading`, anchor comment, blank line, body.
pub fn format_overview_fragments(fragments: &[OverviewFragment]) -> String {
    fragments
        .iter()
        .map(|f| {
            let body = f.text.trim();
            let body = if body.is_empty() { UNAVAILABLE } else { body };
            format!("### {}\n[//]: # (anchor: {})\n\n{body}", f.heading, f.anchor)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The last `limit` bullet entries of the overview change log, oldest first.
///
/// `limit` is clamped to `1..=25`.
pub async fn read_change_log_entries(
    updater: &SnapshotUpdater,
    user_id: &str,
    limit: usize,
) -> Result<Vec<String>> {
    let limit = limit.clamp(1, MAX_CHANGE_LOG_ENTRIES);
    updater.ensure_user_overview_exists(user_id).await?;

    let path = user_overview_path(user_id);
    let Some(sections) = read_sections(updater, SnapshotKind::Overview, &path).await? else {
        return Ok(Vec::new());
    };
    let Some(log) = sections.get(ANCHOR_CHANGE_LOG) else {
        return Ok(Vec::new());
    };

    let entries: Vec<String> = log
        .text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("- "))
        .map(str::to_string)
        .collect();
    let skip = entries.len().saturating_sub(limit);
    Ok(entries.into_iter().skip(skip).collect())
}

pub async fn read_part_profile_sections(
    updater: &SnapshotUpdater,
    user_id: &str,
    part_id: &str,
) -> Result<Option<SectionMap>> {
    read_sections(
        updater,
        SnapshotKind::PartProfile,
        &part_profile_path(user_id, part_id),
    )
    .await
}

pub async fn read_relationship_profile_sections(
    updater: &SnapshotUpdater,
    user_id: &str,
    rel_id: &str,
) -> Result<Option<SectionMap>> {
    read_sections(
        updater,
        SnapshotKind::RelationshipProfile,
        &relationship_profile_path(user_id, rel_id),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::events::NullEventSink;
    use crate::memory::paths::EntityRef;
    use crate::storage::memory::InMemoryStorage;
    use std::sync::Arc;

    fn updater() -> SnapshotUpdater {
        SnapshotUpdater::new(Arc::new(InMemoryStorage::new()), Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn first_load_scaffolds_overview() {
        let updater = updater();
        let snapshot = load_overview_snapshot(&updater, " u1 ").await.unwrap();
        assert!(snapshot.created);
        let anchors: Vec<&str> = snapshot.fragments.iter().map(|f| f.anchor.as_str()).collect();
        assert_eq!(anchors, OVERVIEW_ANCHORS.to_vec());

        let again = load_overview_snapshot(&updater, "u1").await.unwrap();
        assert!(!again.created);
        assert_eq!(again.fragments, snapshot.fragments);
    }

    #[tokio::test]
    async fn blank_user_is_none() {
        assert!(load_overview_snapshot(&updater(), "   ").await.is_none());
    }

    #[test]
    fn formatting_substitutes_placeholder() {
        let fragments = vec![
            OverviewFragment {
                anchor: "identity".into(),
                heading: "Identity".into(),
                text: "- User ID: u1".into(),
            },
            OverviewFragment {
                anchor: "current_focus".into(),
                heading: "Current Focus".into(),
                text: "  ".into(),
            },
        ];
        assert_eq!(
            format_overview_fragments(&fragments),
            "### Identity\n[//]: # (anchor: identity)\n\n- User ID: u1\n\n\
             ### Current Focus\n[//]: # (anchor: current_focus)\n\nUnavailable"
        );
        assert_eq!(format_overview_fragments(&[]), "");
    }

    #[tokio::test]
    async fn change_log_entries_are_tail_limited() {
        let updater = updater();
        let path = updater.ensure_user_overview_exists("u1").await.unwrap().path;
        for i in 0..3 {
            updater
                .append_change_log_with_event("u1", EntityRef::User, &path, &format!("entry {i}"), None)
                .await
                .unwrap();
        }

        let entries = read_change_log_entries(&updater, "u1", 2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with("entry 1"));
        assert!(entries[1].ends_with("entry 2"));

        let all = read_change_log_entries(&updater, "u1", 0).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn missing_profiles_read_as_none() {
        let updater = updater();
        assert!(read_part_profile_sections(&updater, "u1", "p1").await.unwrap().is_none());
        assert!(read_relationship_profile_sections(&updater, "u1", "r1")
            .await
            .unwrap()
            .is_none());
    }
}
