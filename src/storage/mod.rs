//! Text blob storage for markdown snapshots.
//!
//! The core only talks to [`StorageAdapter`]. Backends are selected by
//! `[storage] backend` via [`create_adapter`]: a local filesystem root, a
//! remote object bucket over HTTP, or an in-process map.

pub mod local;
pub mod memory;
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::MemoryConfig;

pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Async path-addressed text store.
///
/// `get_text` returns `Ok(None)` for a missing object; every other failure is an
/// infrastructure error and propagates to the caller.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get_text(&self, path: &str) -> Result<Option<String>>;

    async fn put_text(&self, path: &str, text: &str, content_type: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// All object paths under `prefix`, relative to the store root.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove an object. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Short backend name for logs and diagnostics.
    fn backend(&self) -> &'static str;
}

/// Build the configured storage backend.
pub fn create_adapter(config: &MemoryConfig) -> Result<Arc<dyn StorageAdapter>> {
    match config.storage.backend.as_str() {
        "local" => {
            let root = config.resolved_local_root();
            Ok(Arc::new(local::LocalFsStorage::new(root)))
        }
        "remote" => {
            let adapter = remote::RemoteBucketStorage::from_config(&config.storage)?;
            Ok(Arc::new(adapter))
        }
        "memory" => Ok(Arc::new(memory::InMemoryStorage::new())),
        other => anyhow::bail!("unknown storage backend: {other}. Supported: local, remote, memory"),
    }
}
