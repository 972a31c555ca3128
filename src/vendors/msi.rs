use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

use super::{resolve_url, Category, VendorScraper};
use crate::browser::{element_text, parse_selector, BrowserSession, DEFAULT_WAIT_TIMEOUT};
use crate::models::RawFields;
use crate::rate_limiter::RateLimitConfig;
use crate::utils::error::Result;

pub const MSI_BASE_URL: &str = "https://www.msisurfaces.com";

const LISTING_READY: &str = r#".product-grid, .products-list, [class*="product"]"#;
const PRODUCT_LINKS: &str = r#".product-item a, .product-card a, [class*="product"] a[href*="/"]"#;

const PRODUCT_READY: &str = r#"h1, .product-title, [class*="product-name"]"#;
const NAME: &str = PRODUCT_READY;
const SKU: &str = r#"[class*="sku"], [data-sku], .product-sku"#;
const DESCRIPTION: &str = r#".product-description, [class*="description"]"#;
const MAIN_IMAGE: &str = r#".product-image img, .gallery-main img, [class*="product"] img"#;
const GALLERY_IMAGES: &str = r#".product-images img, .gallery img, [class*="thumbnail"] img"#;
const SPEC_ROWS: &str = r#".spec-row, .product-spec, [class*="specification"] tr"#;
const SPEC_LABEL: &str = ".spec-label, th, dt";
const SPEC_VALUE: &str = ".spec-value, td, dd";

static SKU_FROM_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/([a-z0-9-]+)/?$").expect("sku path pattern is valid"));

pub struct MsiScraper {
    base_url: String,
    categories: Vec<Category>,
}

impl MsiScraper {
    pub fn new() -> Self {
        Self::with_base_url(MSI_BASE_URL)
    }

    /// Same strategy against another host, e.g. a local mirror.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            categories: vec![
                Category::new("Quartz", "/quartz-countertops"),
                Category::new("Granite", "/natural-stone-granite"),
                Category::new("Marble", "/natural-stone-marble"),
                Category::new("Quartzite", "/natural-stone-quartzite"),
                Category::new("Porcelain", "/porcelain-countertops"),
            ],
        }
    }
}

impl Default for MsiScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VendorScraper for MsiScraper {
    fn id(&self) -> &str {
        "msi"
    }

    fn name(&self) -> &str {
        "MSI Surfaces"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn rate_limit(&self) -> Option<RateLimitConfig> {
        Some(RateLimitConfig {
            min_delay_ms: 2000,
            max_delay_ms: 4000,
        })
    }

    async fn product_links(&self, page: &dyn BrowserSession, category: &Category) -> Result<Vec<String>> {
        if !page.wait_for(LISTING_READY, DEFAULT_WAIT_TIMEOUT).await {
            debug!("[msi] Product grid did not appear for {}", category.name);
        }

        let hrefs = page.extract_all(PRODUCT_LINKS, Some("href")).await?;
        Ok(collect_links(&self.base_url, hrefs))
    }

    async fn extract(&self, page: &dyn BrowserSession) -> Result<RawFields> {
        if !page.wait_for(PRODUCT_READY, DEFAULT_WAIT_TIMEOUT).await {
            debug!("[msi] Product heading did not appear");
        }

        let html = page.content().await?;
        let page_url = page.current_url().await?;
        parse_product_page(&html, &page_url)
    }
}

/// Resolve listing hrefs, dropping fragments and repeats.
pub fn collect_links(base_url: &str, hrefs: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    hrefs
        .into_iter()
        .filter(|href| !href.contains('#'))
        .filter_map(|href| resolve_url(base_url, &href))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

pub fn parse_product_page(html: &str, page_url: &str) -> Result<RawFields> {
    let document = Html::parse_document(html);

    let first_text = |selector: &str| -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        Ok(document
            .select(&selector)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty()))
    };

    let name = first_text(NAME)?;
    let description = first_text(DESCRIPTION)?;
    let sku = extract_sku(&document, page_url)?;

    let main_image = document
        .select(&parse_selector(MAIN_IMAGE)?)
        .next()
        .and_then(image_source)
        .and_then(|src| resolve_url(page_url, &src));

    let mut images: Vec<String> = Vec::new();
    for img in document.select(&parse_selector(GALLERY_IMAGES)?) {
        if let Some(url) = image_source(img).and_then(|src| resolve_url(page_url, &src)) {
            if !images.contains(&url) {
                images.push(url);
            }
        }
    }

    Ok(RawFields {
        name,
        sku,
        description,
        main_image,
        images,
        specs: extract_specs(&document)?,
    })
}

fn extract_sku(document: &Html, page_url: &str) -> Result<Option<String>> {
    if let Some(element) = document.select(&parse_selector(SKU)?).next() {
        let sku: String = element_text(element)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        return Ok((!sku.is_empty()).then_some(sku));
    }

    let path = url::Url::parse(page_url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    Ok(SKU_FROM_PATH
        .captures(&path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

fn extract_specs(document: &Html) -> Result<BTreeMap<String, String>> {
    let label_selector = parse_selector(SPEC_LABEL)?;
    let value_selector = parse_selector(SPEC_VALUE)?;
    let mut specs = BTreeMap::new();

    for row in document.select(&parse_selector(SPEC_ROWS)?) {
        let label = row.select(&label_selector).next().map(element_text);
        let value = row.select(&value_selector).next().map(element_text);

        if let (Some(label), Some(value)) = (label, value) {
            if !label.is_empty() && !value.is_empty() {
                specs.insert(label.to_lowercase(), value);
            }
        }
    }

    Ok(specs)
}

fn image_source(img: ElementRef<'_>) -> Option<String> {
    let attrs = img.value();
    attrs
        .attr("src")
        .or_else(|| attrs.attr("data-src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}
