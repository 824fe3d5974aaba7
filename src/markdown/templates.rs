//! Initial documents for overview and profile snapshots, plus the
//! change-log line format they share.

use chrono::{DateTime, SecondsFormat, Utc};

use super::canonical::canonicalize_text;

pub const ANCHOR_IDENTITY: &str = "identity";
pub const ANCHOR_CURRENT_FOCUS: &str = "current_focus";
pub const ANCHOR_CONFIRMED_PARTS: &str = "confirmed_parts";
pub const ANCHOR_ROLE: &str = "role";
pub const ANCHOR_EVIDENCE: &str = "evidence";
pub const ANCHOR_DYNAMICS: &str = "dynamics";
pub const ANCHOR_CHANGE_LOG: &str = "change_log";

/// Identity fields written into a new part profile.
#[derive(Debug, Clone)]
pub struct PartSeed {
    pub user_id: String,
    pub part_id: String,
    pub name: String,
    pub status: String,
    pub category: String,
}

/// Identity fields written into a new relationship profile.
#[derive(Debug, Clone)]
pub struct RelationshipSeed {
    pub user_id: String,
    pub rel_id: String,
    pub part_ids: Vec<String>,
    pub rel_type: String,
}

/// ISO-8601 UTC with millisecond precision, e.g. `2026-01-01T00:00:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `[fp:<fingerprint>]`
pub fn fingerprint_tag(fingerprint: &str) -> String {
    format!("[fp:{fingerprint}]")
}

/// `- <timestamp>: <message>` with an optional trailing fingerprint tag.
pub fn change_log_line(at: DateTime<Utc>, message: &str, fingerprint: Option<&str>) -> String {
    let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
    match fingerprint {
        Some(fp) => format!("- {}: {message} {}", iso_timestamp(at), fingerprint_tag(fp)),
        None => format!("- {}: {message}", iso_timestamp(at)),
    }
}

fn section(heading: &str, anchor: &str, body: &str) -> String {
    format!("## {heading}\n[//]: # (anchor: {anchor})\n\n{body}\n\n")
}

pub fn build_user_overview_markdown(user_id: &str, at: DateTime<Utc>) -> String {
    let mut doc = String::from("# User Overview\n\n");
    doc.push_str(&section("Identity", ANCHOR_IDENTITY, &format!("- User ID: {user_id}")));
    doc.push_str(&section("Current Focus", ANCHOR_CURRENT_FOCUS, "- TBD"));
    doc.push_str(&section("Confirmed Parts", ANCHOR_CONFIRMED_PARTS, "- TBD"));
    doc.push_str(&section(
        "Change Log",
        ANCHOR_CHANGE_LOG,
        &change_log_line(at, "initialized overview", None),
    ));
    canonicalize_text(doc.trim_end())
}

pub fn build_part_profile_markdown(part: &PartSeed, at: DateTime<Utc>) -> String {
    let identity = format!(
        "- Part ID: {}\n- User ID: {}\n- Status: {}\n- Category: {}",
        part.part_id, part.user_id, part.status, part.category
    );
    let mut doc = format!("# Part: {}\n\n", part.name);
    doc.push_str(&section("Identity", ANCHOR_IDENTITY, &identity));
    doc.push_str(&section("Role", ANCHOR_ROLE, "- TBD"));
    doc.push_str(&section("Evidence (curated)", ANCHOR_EVIDENCE, "- (add up to 7 items)"));
    doc.push_str(&section(
        "Change Log",
        ANCHOR_CHANGE_LOG,
        &change_log_line(at, "initialized profile", None),
    ));
    canonicalize_text(doc.trim_end())
}

pub fn build_relationship_profile_markdown(rel: &RelationshipSeed, at: DateTime<Utc>) -> String {
    let parts = if rel.part_ids.is_empty() {
        "(none)".to_string()
    } else {
        rel.part_ids.join(", ")
    };
    let identity = format!(
        "- Relationship ID: {}\n- User ID: {}\n- Type: {}\n- Parts: {parts}",
        rel.rel_id, rel.user_id, rel.rel_type
    );
    let mut doc = format!("# Relationship: {}\n\n", rel.rel_type);
    doc.push_str(&section("Identity", ANCHOR_IDENTITY, &identity));
    doc.push_str(&section("Dynamics", ANCHOR_DYNAMICS, "- TBD"));
    doc.push_str(&section(
        "Change Log",
        ANCHOR_CHANGE_LOG,
        &change_log_line(at, "initialized relationship profile", None),
    ));
    canonicalize_text(doc.trim_end())
}
