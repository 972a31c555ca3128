use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::ContentStore;
use crate::utils::error::{AppError, Result};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Copies a vendor's product images into the content store.
pub struct ImageArchiver {
    client: Client,
    store: Arc<dyn ContentStore>,
    vendor_id: String,
}

impl ImageArchiver {
    pub fn new(vendor_id: impl Into<String>, store: Arc<dyn ContentStore>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            store,
            vendor_id: vendor_id.into(),
        })
    }

    /// Fetch `image_url` and upload it, returning the stored copy's public URL.
    pub async fn archive(&self, image_url: &str, sku: &str) -> Result<String> {
        let response = self.client.get(image_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Storage(format!(
                "Image fetch {} failed with HTTP {}",
                image_url,
                status.as_u16()
            )));
        }

        let content_type = content_type_of(response.headers());
        let bytes = response.bytes().await?;

        let key = object_key(&self.vendor_id, sku, &content_type);
        debug!("Archiving {} ({} bytes) as {}", image_url, bytes.len(), key);

        self.store.upload(&key, bytes.to_vec(), &content_type).await
    }
}

/// Response content type, JPEG when the header is missing or unreadable.
fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// `{vendor}/{sku}.{ext}` with every non-alphanumeric SKU character replaced by `-`.
pub fn object_key(vendor_id: &str, sku: &str, content_type: &str) -> String {
    let ext = if content_type.contains("png") { "png" } else { "jpg" };
    let safe_sku: String = sku
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    format!("{}/{}.{}", vendor_id, safe_sku, ext)
}
