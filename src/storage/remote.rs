//! Remote object-bucket backend speaking the Supabase Storage REST dialect.
//!
//! Objects live at `{base}/storage/v1/object/{bucket}/{path}`; listing goes
//! through `POST {base}/storage/v1/object/list/{bucket}`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::StorageAdapter;
use crate::config::StorageConfig;

const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct RemoteBucketStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    /// Folders come back without an id.
    id: Option<String>,
}

impl RemoteBucketStorage {
    pub fn new(base_url: &str, bucket: &str, service_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let Some(url) = config.remote_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            bail!("remote storage requires [storage] remote_url (or MDMEMORY_REMOTE_URL)");
        };
        let Some(key) = config.remote_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            bail!("remote storage requires [storage] remote_key (or MDMEMORY_REMOTE_KEY)");
        };
        Self::new(url, &config.remote_bucket, key)
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    async fn list_raw(
        &self,
        prefix: &str,
        search: Option<&str>,
        offset: usize,
    ) -> Result<Vec<ListedObject>> {
        let url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let mut body = json!({
            "prefix": prefix.trim_matches('/'),
            "limit": LIST_PAGE_SIZE,
            "offset": offset,
        });
        if let Some(search) = search {
            body["search"] = json!(search);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("list request failed for prefix {prefix}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("list failed with HTTP {status}: {text}");
        }
        response
            .json::<Vec<ListedObject>>()
            .await
            .context("invalid list response")
    }

    /// Every entry directly under `prefix`, following pagination.
    async fn list_dir(&self, prefix: &str) -> Result<Vec<ListedObject>> {
        let mut out = Vec::new();
        loop {
            let page = self.list_raw(prefix, None, out.len()).await?;
            let full = page.len() >= LIST_PAGE_SIZE;
            out.extend(page);
            if !full {
                return Ok(out);
            }
        }
    }
}

fn join_prefix(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// The bucket API reports a missing object as 404, or as 400 with a not-found body.
fn is_not_found(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("not found"))
        || (status == StatusCode::BAD_REQUEST && body.contains("not_found"))
}

#[async_trait]
impl StorageAdapter for RemoteBucketStorage {
    async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.object_url(path))
            .bearer_auth(&self.service_key)
            .send()
            .await
            .with_context(|| format!("download request failed for {path}"))?;

        let status = response.status();
        let text = response.text().await.context("error reading object body")?;
        if status.is_success() {
            return Ok(Some(text));
        }
        if is_not_found(status, &text) {
            return Ok(None);
        }
        bail!("download of {path} failed with HTTP {status}: {text}")
    }

    async fn put_text(&self, path: &str, text: &str, content_type: &str) -> Result<()> {
        let response = self
            .client
            .post(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(text.to_string())
            .send()
            .await
            .with_context(|| format!("upload request failed for {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("upload of {path} failed with HTTP {status}: {body}");
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = path.trim_start_matches('/');
        let (parent, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent, name),
            None => ("", path),
        };
        let listed = self.list_raw(parent, Some(name), 0).await?;
        Ok(listed.iter().any(|o| o.name == name && o.id.is_some()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut folders = vec![prefix.trim_matches('/').to_string()];

        while let Some(folder) = folders.pop() {
            for object in self.list_dir(&folder).await? {
                let path = join_prefix(&folder, &object.name);
                match object.id {
                    Some(_) => out.push(path),
                    None => folders.push(path),
                }
            }
        }

        out.sort();
        Ok(out)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.service_key)
            .json(&json!({ "prefixes": [path.trim_start_matches('/')] }))
            .send()
            .await
            .with_context(|| format!("delete request failed for {path}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_not_found(status, &body) {
                return Ok(());
            }
            bail!("delete of {path} failed with HTTP {status}: {body}");
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "remote"
    }
}
