//! Entity identity and the storage path convention.
//!
//! Call sites carry an explicit [`EntityRef`] alongside a document path.
//! [`infer_entity_ref`] exists only for callers that receive a bare path
//! (e.g. MCP write tools).

use serde::{Deserialize, Serialize};

/// Entity category recorded on mutation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Part,
    Relationship,
    Note,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Part => "part",
            Self::Relationship => "relationship",
            Self::Note => "note",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "part" => Ok(Self::Part),
            "relationship" => Ok(Self::Relationship),
            "note" => Ok(Self::Note),
            _ => Err(format!("unknown entity type: {s}")),
        }
    }
}

/// The document owner a mutation is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    User,
    Part(String),
    Relationship(String),
    Note,
}

impl EntityRef {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::User => EntityType::User,
            Self::Part(_) => EntityType::Part,
            Self::Relationship(_) => EntityType::Relationship,
            Self::Note => EntityType::Note,
        }
    }

    /// Id recorded on events; a user-level document is identified by its owner.
    pub fn entity_id(&self, user_id: &str) -> Option<String> {
        match self {
            Self::User => Some(user_id.to_string()),
            Self::Part(id) | Self::Relationship(id) => Some(id.clone()),
            Self::Note => None,
        }
    }

    /// Canonical snapshot path for this entity, if it has one.
    pub fn snapshot_path(&self, user_id: &str) -> Option<String> {
        match self {
            Self::User => Some(user_overview_path(user_id)),
            Self::Part(id) => Some(part_profile_path(user_id, id)),
            Self::Relationship(id) => Some(relationship_profile_path(user_id, id)),
            Self::Note => None,
        }
    }
}

pub fn user_overview_path(user_id: &str) -> String {
    format!("users/{user_id}/overview.md")
}

pub fn part_profile_path(user_id: &str, part_id: &str) -> String {
    format!("users/{user_id}/parts/{part_id}/profile.md")
}

pub fn relationship_profile_path(user_id: &str, rel_id: &str) -> String {
    format!("users/{user_id}/relationships/{rel_id}/profile.md")
}

/// Recover the entity from a `users/<uid>/...` path.
///
/// Anything outside the convention, or under a different user, is a `Note`.
pub fn infer_entity_ref(path: &str, user_id: &str) -> EntityRef {
    let normalized = path.replace('\\', "/");
    let mut segments = normalized.trim_start_matches('/').split('/');

    if segments.next() != Some("users") {
        return EntityRef::Note;
    }
    match segments.next() {
        Some(uid) if !uid.is_empty() && uid == user_id => {}
        _ => return EntityRef::Note,
    }

    match (segments.next(), segments.next()) {
        (Some("parts"), Some(id)) if !id.is_empty() => EntityRef::Part(id.to_string()),
        (Some("relationships"), Some(id)) if !id.is_empty() => {
            EntityRef::Relationship(id.to_string())
        }
        _ => EntityRef::User,
    }
}
