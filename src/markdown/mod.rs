//! Markdown document model: canonical hashing, anchored sections, templates,
//! and the storage-backed editor.

pub mod canonical;
pub mod editor;
pub mod sections;
pub mod templates;

pub use canonical::{canonicalize_json, canonicalize_text, content_hash};
pub use sections::{
    lint_markdown, list_sections, patch_section_by_anchor, read_section_map, LintReport,
    PatchResult, SectionChange, SectionInfo, SectionMap, SectionText,
};

/// Document-level failures a caller must handle before any side effect happens.
#[derive(Debug, thiserror::Error)]
pub enum MarkdownError {
    #[error("Section with anchor '{0}' not found")]
    AnchorNotFound(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Markdown file already exists: {0}")]
    AlreadyExists(String),
    #[error("Markdown payload exceeds size limits ({size} > {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("invalid markdown path: {0}")]
    InvalidPath(String),
}
