//! Markdown-backed per-user memory.
//!
//! Long-lived facts about a user (an overview, "part" profiles, relationship
//! profiles) are stored as markdown documents whose H2 sections carry stable
//! anchor markers. Documents change only through anchor patches; each
//! committed patch emits one audit event, and writes can be guarded by the
//! document's canonical content hash.
//!
//! Application events are queued idempotently and periodically folded into
//! a single change-log line by an external summarizer.
//!
//! # Modules
//!
//! - [`config`]: TOML + environment configuration
//! - [`db`]: SQLite holding the pending-update queue and the mutation event log
//! - [`storage`]: text blob backends (local filesystem, remote bucket, in-memory)
//! - [`markdown`]: canonical hashing, anchored sections, templates, the editor
//! - [`memory`]: entity paths, mutation events, snapshot updater, overview reads, queue
//! - [`summarizer`]: digest generator contract, OpenRouter generator, update runner

pub mod config;
pub mod db;
pub mod markdown;
pub mod memory;
pub mod storage;
pub mod summarizer;
