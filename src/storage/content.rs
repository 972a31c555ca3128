use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::utils::error::{AppError, Result};

/// Destination for archived images.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object, and return its public URL.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Object storage over its REST API (`/object/{bucket}/{key}`).
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    api_key: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, api_key: impl Into<String>, bucket: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            bucket: bucket.into(),
        })
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/object/public/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl ContentStore for HttpObjectStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = format!("{}/object/{}/{}", self.endpoint, self.bucket, key);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!(
                "Upload of {} failed with HTTP {}: {}",
                key,
                status.as_u16(),
                body
            )));
        }

        debug!("Uploaded {} to bucket {}", key, self.bucket);
        Ok(self.public_url(key))
    }
}

/// Writes objects below a local directory.
pub struct LocalContentStore {
    root: PathBuf,
    public_base: String,
}

impl LocalContentStore {
    /// Without `public_base`, returned URLs are `file://` URLs into `root`.
    pub fn new(root: impl Into<PathBuf>, public_base: Option<String>) -> Self {
        let root = root.into();
        let public_base = public_base
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("file://{}", root.display()));

        Self { root, public_base }
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        Ok(format!("{}/{}", self.public_base, key))
    }
}
