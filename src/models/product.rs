use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;
use validator::Validate;

use crate::utils::error::Result;

static PRICE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)").expect("price pattern is valid")
});

/// Fields a vendor strategy pulls off a product page, before any normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawFields {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub main_image: Option<String>,
    pub images: Vec<String>,
    /// Specification table rows, label lowercased.
    pub specs: BTreeMap<String, String>,
}

impl RawFields {
    /// First spec value whose label contains `needle`.
    pub fn spec(&self, needle: &str) -> Option<&str> {
        self.specs
            .iter()
            .find(|(label, _)| label.contains(needle))
            .map(|(_, value)| value.as_str())
    }
}

/// One vendor SKU as scraped during this run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub thickness: Option<String>,
    pub finish: Option<String>,
    pub price: Option<Decimal>,
    pub images: Vec<String>,
    pub archived_image_url: Option<String>,
    #[validate(url)]
    pub source_url: String,
}

impl ProductRecord {
    /// Build a record from extracted fields.
    ///
    /// Returns `Ok(None)` when the page has no usable name or SKU; such pages
    /// are skipped rather than treated as errors.
    pub fn from_raw(raw: RawFields, category: &str, source_url: &str) -> Result<Option<Self>> {
        let (Some(name), Some(sku)) = (non_blank(raw.name.as_deref()), non_blank(raw.sku.as_deref())) else {
            return Ok(None);
        };

        let material = raw
            .spec("material")
            .map(str::to_string)
            .or_else(|| non_blank(Some(category)));

        let record = ProductRecord {
            sku,
            name,
            description: non_blank(raw.description.as_deref()),
            category: non_blank(Some(category)),
            material,
            color: raw.spec("color").map(str::to_string),
            thickness: raw.spec("thickness").map(str::to_string),
            finish: raw.spec("finish").map(str::to_string),
            price: raw.spec("price").and_then(parse_price),
            images: raw.images,
            archived_image_url: None,
            source_url: source_url.to_string(),
        };

        record.validate()?;
        Ok(Some(record))
    }

    pub fn with_archived_image(mut self, url: String) -> Self {
        self.archived_image_url = Some(url);
        self
    }
}

/// Previously persisted product snapshot used as the comparison baseline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub sku: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub material: Option<String>,
    pub color: Option<String>,
    pub thickness: Option<String>,
    pub finish: Option<String>,
    pub price: Option<Decimal>,
    pub images: Vec<String>,
}

impl CatalogEntry {
    /// The entry a scraped record becomes once persisted.
    pub fn from_record(id: impl Into<String>, record: &ProductRecord) -> Self {
        Self {
            id: id.into(),
            sku: record.sku.clone(),
            name: Some(record.name.clone()),
            description: record.description.clone(),
            category: record.category.clone(),
            material: record.material.clone(),
            color: record.color.clone(),
            thickness: record.thickness.clone(),
            finish: record.finish.clone(),
            price: record.price,
            images: record.images.clone(),
        }
    }
}

/// Pull a decimal amount out of text such as `$1,249.50 / sq ft`.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let captures = PRICE_REGEX.captures(text)?;
    let amount = captures.get(1)?.as_str().replace(',', "");
    Decimal::from_str(&amount).ok()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
