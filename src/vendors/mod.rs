//! Per-vendor scraping strategies and the registry the CLI resolves them from.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::browser::BrowserSession;
use crate::models::RawFields;
use crate::rate_limiter::RateLimitConfig;
use crate::utils::error::{AppError, Result};

pub mod msi;

pub use msi::MsiScraper;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub path: String,
}

impl Category {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Knows where a vendor lists its products and how to read a product page.
#[async_trait]
pub trait VendorScraper: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn base_url(&self) -> &str;
    fn categories(&self) -> &[Category];

    /// Vendor-specific pacing; `None` uses the configured default.
    fn rate_limit(&self) -> Option<RateLimitConfig> {
        None
    }

    fn category_url(&self, category: &Category) -> Result<String> {
        resolve_url(self.base_url(), &category.path)
            .ok_or_else(|| AppError::Extraction(format!("Cannot build URL for category {}", category.name)))
    }

    /// Absolute product URLs on the already-loaded listing page, in page order.
    async fn product_links(&self, page: &dyn BrowserSession, category: &Category) -> Result<Vec<String>>;

    /// Read the already-loaded product page.
    async fn extract(&self, page: &dyn BrowserSession) -> Result<RawFields>;
}

/// Resolve `href` against `base`, dropping anything that is not http(s).
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorInfo {
    pub id: String,
    pub name: String,
    pub base_url: String,
}

pub struct VendorRegistry {
    vendors: Vec<Arc<dyn VendorScraper>>,
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self { vendors: Vec::new() }
    }

    /// Registry with every built-in vendor.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MsiScraper::new()));
        registry
    }

    /// Register a vendor, replacing any previous one with the same id.
    pub fn register(&mut self, vendor: Arc<dyn VendorScraper>) {
        match self.vendors.iter().position(|v| v.id() == vendor.id()) {
            Some(index) => self.vendors[index] = vendor,
            None => self.vendors.push(vendor),
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.vendors.iter().any(|v| v.id() == id)
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn VendorScraper>> {
        self.vendors
            .iter()
            .find(|v| v.id() == id)
            .cloned()
            .ok_or_else(|| AppError::UnknownVendor {
                vendor: id.to_string(),
                available: self.ids(),
            })
    }

    pub fn ids(&self) -> Vec<String> {
        self.vendors.iter().map(|v| v.id().to_string()).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn VendorScraper>> {
        self.vendors.clone()
    }

    pub fn list(&self) -> Vec<VendorInfo> {
        self.vendors
            .iter()
            .map(|v| VendorInfo {
                id: v.id().to_string(),
                name: v.name().to_string(),
                base_url: v.base_url().to_string(),
            })
            .collect()
    }
}

impl Default for VendorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
