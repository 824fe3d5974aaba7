//! Read → patch → lint → write against a [`StorageAdapter`].
//!
//! Every operation reads the current document, computes the full result in
//! memory, and performs at most one `put_text`. Failures (missing file,
//! missing anchor, oversize payload, hash conflict) are detected before the
//! write, so callers never observe a partial update.

use anyhow::Result;
use serde::Serialize;

use super::canonical::content_hash;
use super::sections::{lint_markdown, list_sections, patch_section_by_anchor, SectionChange};
use super::templates::build_user_overview_markdown;
use super::MarkdownError;
use crate::storage::{StorageAdapter, MARKDOWN_CONTENT_TYPE};

pub const MAX_WRITE_BYTES: usize = 1_000_000;

const USER_ROOT: &str = "users";

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub path: String,
    pub anchor: String,
    pub before_hash: String,
    pub after_hash: String,
    pub bytes_written: usize,
    pub warnings: Vec<String>,
}

/// Result of a hash-guarded write. A conflict is a value, not an error.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Written(EditOutcome),
    Conflict { current_hash: String },
}

impl WriteOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Written(o) => serde_json::json!({
                "success": true,
                "before_hash": o.before_hash,
                "after_hash": o.after_hash,
                "bytes_written": o.bytes_written,
                "warnings": o.warnings,
            }),
            Self::Conflict { current_hash } => serde_json::json!({
                "success": false,
                "conflict": true,
                "current_hash": current_hash,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionRef {
    pub anchor: String,
    pub heading: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewOutcome {
    pub before_hash: String,
    pub after_hash: String,
    pub preview: String,
    pub section: SectionRef,
    pub bytes_delta: i64,
    pub warnings: Vec<String>,
}

/// Initial content for [`create_markdown_file`].
#[derive(Debug, Clone)]
pub enum NewDocument {
    Overview { user_id: String },
    Blank,
    Initial(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub path: String,
    pub hash: String,
}

fn check_size(text: &str) -> Result<(), MarkdownError> {
    if text.len() > MAX_WRITE_BYTES {
        return Err(MarkdownError::PayloadTooLarge {
            size: text.len(),
            limit: MAX_WRITE_BYTES,
        });
    }
    Ok(())
}

async fn read_existing(storage: &dyn StorageAdapter, path: &str) -> Result<String> {
    match storage.get_text(path).await? {
        Some(text) => Ok(text),
        None => Err(MarkdownError::FileNotFound(path.to_string()).into()),
    }
}

/// Patch one anchored section and write the document back.
pub async fn edit_markdown_section(
    storage: &dyn StorageAdapter,
    path: &str,
    anchor: &str,
    change: &SectionChange,
) -> Result<EditOutcome> {
    match write_markdown_section(storage, path, anchor, change, None).await? {
        WriteOutcome::Written(outcome) => Ok(outcome),
        // unreachable without an expected hash
        WriteOutcome::Conflict { current_hash } => {
            anyhow::bail!("unexpected conflict on unguarded write (current {current_hash})")
        }
    }
}

/// Patch one anchored section, rejecting the write if the stored document no
/// longer hashes to `expected_before_hash`.
pub async fn write_markdown_section(
    storage: &dyn StorageAdapter,
    path: &str,
    anchor: &str,
    change: &SectionChange,
    expected_before_hash: Option<&str>,
) -> Result<WriteOutcome> {
    let text = read_existing(storage, path).await?;

    if let Some(expected) = expected_before_hash {
        let current_hash = content_hash(&text);
        if expected != current_hash {
            tracing::info!(path, anchor, %current_hash, "rejecting write on hash conflict");
            return Ok(WriteOutcome::Conflict { current_hash });
        }
    }

    check_size(change.text())?;
    let patched = patch_section_by_anchor(&text, anchor, change)?;
    check_size(&patched.text)?;
    let lint = lint_markdown(&patched.text);

    storage
        .put_text(path, &patched.text, MARKDOWN_CONTENT_TYPE)
        .await?;

    tracing::debug!(
        path,
        anchor,
        mode = change.mode(),
        after_hash = %patched.after_hash,
        warnings = lint.warnings.len(),
        "markdown section written"
    );

    Ok(WriteOutcome::Written(EditOutcome {
        path: path.to_string(),
        anchor: anchor.to_string(),
        before_hash: patched.before_hash,
        after_hash: patched.after_hash,
        bytes_written: patched.text.len(),
        warnings: lint.warnings,
    }))
}

/// Compute what [`write_markdown_section`] would produce without writing.
pub async fn preview_markdown_section(
    storage: &dyn StorageAdapter,
    path: &str,
    anchor: &str,
    change: &SectionChange,
) -> Result<PreviewOutcome> {
    let text = read_existing(storage, path).await?;
    let section = list_sections(&text)
        .into_iter()
        .find(|s| s.anchor == anchor)
        .ok_or_else(|| MarkdownError::AnchorNotFound(anchor.to_string()))?;

    check_size(change.text())?;
    let patched = patch_section_by_anchor(&text, anchor, change)?;
    let lint = lint_markdown(&patched.text);
    let bytes_delta = patched.text.len() as i64 - text.len() as i64;

    Ok(PreviewOutcome {
        before_hash: patched.before_hash,
        after_hash: patched.after_hash,
        preview: patched.text,
        section: SectionRef {
            anchor: section.anchor,
            heading: section.heading,
        },
        bytes_delta,
        warnings: lint.warnings,
    })
}

/// Create a new markdown document; fails if one already exists at `path`.
pub async fn create_markdown_file(
    storage: &dyn StorageAdapter,
    path: &str,
    template: NewDocument,
) -> Result<CreateOutcome> {
    if storage.get_text(path).await?.is_some() {
        return Err(MarkdownError::AlreadyExists(path.to_string()).into());
    }

    let content = match template {
        NewDocument::Overview { user_id } => {
            build_user_overview_markdown(&user_id, chrono::Utc::now())
        }
        NewDocument::Blank => "# Untitled\n\n".to_string(),
        NewDocument::Initial(text) => text,
    };
    check_size(&content)?;

    storage
        .put_text(path, &content, MARKDOWN_CONTENT_TYPE)
        .await?;

    Ok(CreateOutcome {
        path: path.to_string(),
        hash: content_hash(&content),
    })
}

/// Scope a caller-supplied relative path to `users/<user_id>/`.
///
/// Rejects empty user ids, `..` segments, and targets that are not `.md` files.
/// A path already rooted at the same user's directory is accepted as-is.
pub fn resolve_user_markdown_path(user_id: &str, relative: &str) -> Result<String, MarkdownError> {
    let user_id = user_id.trim();
    if user_id.is_empty() || user_id.contains(['/', '\\']) || user_id == ".." {
        return Err(MarkdownError::InvalidPath(format!("bad user id: {user_id:?}")));
    }

    let normalized = relative.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(MarkdownError::InvalidPath(relative.to_string())),
            other => segments.push(other),
        }
    }

    if segments.len() > 2 && segments[0] == USER_ROOT && segments[1] == user_id {
        segments.drain(..2);
    }

    let joined = segments.join("/");
    if joined.is_empty() || !joined.ends_with(".md") {
        return Err(MarkdownError::InvalidPath(format!(
            "path must target a markdown file: {relative}"
        )));
    }

    Ok(format!("{USER_ROOT}/{user_id}/{joined}"))
}
