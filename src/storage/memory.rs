//! In-process storage backend, used for tests and ephemeral runs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::StorageAdapter;

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    objects: RwLock<BTreeMap<String, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorage {
    async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let objects = self.objects.read().map_err(|e| anyhow!("storage lock poisoned: {e}"))?;
        Ok(objects.get(&Self::key(path)).cloned())
    }

    async fn put_text(&self, path: &str, text: &str, _content_type: &str) -> Result<()> {
        let mut objects = self.objects.write().map_err(|e| anyhow!("storage lock poisoned: {e}"))?;
        objects.insert(Self::key(path), text.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let objects = self.objects.read().map_err(|e| anyhow!("storage lock poisoned: {e}"))?;
        Ok(objects.contains_key(&Self::key(path)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().map_err(|e| anyhow!("storage lock poisoned: {e}"))?;
        let prefix = Self::key(prefix);
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut objects = self.objects.write().map_err(|e| anyhow!("storage lock poisoned: {e}"))?;
        objects.remove(&Self::key(path));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
