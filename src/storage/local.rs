//! Filesystem-rooted storage backend.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::StorageAdapter;

/// Stores each object as a file under `root`. Object paths are always
/// relative; anything that would resolve outside `root` is rejected.
#[derive(Debug, Clone)]
pub struct LocalFsStorage {
    root: PathBuf,
}

impl LocalFsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = path.replace('\\', "/");
        let relative = relative.trim_start_matches('/');
        let mut full = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::CurDir => {}
                _ => bail!("path traversal detected: {path}"),
            }
        }
        Ok(full)
    }
}

const TEMP_SUFFIX: &str = ".tmp";

/// `.<name>.<uuid>.tmp` next to `full`.
fn temp_path(full: &Path) -> PathBuf {
    let name = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    full.with_file_name(format!(".{name}.{}{TEMP_SUFFIX}", uuid::Uuid::now_v7()))
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
}

#[async_trait]
impl StorageAdapter for LocalFsStorage {
    async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", full.display())),
        }
    }

    async fn put_text(&self, path: &str, text: &str, _content_type: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        // one temp file per write; concurrent writers race on the rename only
        let tmp = temp_path(&full);
        if let Err(e) = tokio::fs::write(&tmp, text).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("failed to write {}", tmp.display()));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &full).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("failed to rename into {}", full.display()));
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to stat {}", full.display())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let start = self.resolve(prefix)?;
        let mut out = Vec::new();
        let mut stack = vec![start];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to list {}", dir.display()))
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if is_temp_file(&path) {
                    continue;
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let rel = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(rel);
                }
            }
        }

        out.sort();
        Ok(out)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete {}", full.display())),
        }
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}
