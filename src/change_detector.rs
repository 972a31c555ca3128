//! Field-level diffing of scraped records against the catalog loaded at run start.

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::models::{
    CatalogEntry, ChangeResult, ChangeType, DiscontinuationCandidate, DiscontinuationReason,
    FieldChange, ProductRecord,
};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Smallest price movement reported as a change.
const PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Lowercase, trim, and collapse internal whitespace runs to a single hyphen.
pub fn normalize_sku(sku: &str) -> Option<String> {
    let trimmed = sku.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(WHITESPACE.replace_all(&trimmed.to_lowercase(), "-").into_owned())
}

pub struct ChangeDetector {
    // Insertion-ordered so discontinuation output is stable across runs.
    entries: Vec<(String, CatalogEntry)>,
    index: HashMap<String, usize>,
}

impl ChangeDetector {
    pub fn new(catalog: Vec<CatalogEntry>) -> Self {
        let mut entries: Vec<(String, CatalogEntry)> = Vec::with_capacity(catalog.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(catalog.len());

        for entry in catalog {
            let Some(key) = normalize_sku(&entry.sku) else {
                continue;
            };
            match index.get(&key) {
                Some(&position) => entries[position].1 = entry,
                None => {
                    index.insert(key.clone(), entries.len());
                    entries.push((key, entry));
                }
            }
        }

        Self { entries, index }
    }

    pub fn catalog_size(&self) -> usize {
        self.entries.len()
    }

    fn lookup(&self, sku: &str) -> Option<&CatalogEntry> {
        let key = normalize_sku(sku)?;
        self.index.get(&key).map(|&position| &self.entries[position].1)
    }

    pub fn detect_changes(&self, record: &ProductRecord) -> ChangeResult {
        let mut result = ChangeResult {
            sku: record.sku.clone(),
            name: record.name.clone(),
            is_new: false,
            price_changed: false,
            image_changed: false,
            data_changed: false,
            changes: Vec::new(),
        };

        let Some(existing) = self.lookup(&record.sku) else {
            result.is_new = true;
            result.changes.push(FieldChange {
                field: "product".to_string(),
                change_type: ChangeType::New,
                old: None,
                new: None,
                message: "New product detected".to_string(),
            });
            return result;
        };

        if let (Some(old), Some(new)) = (existing.price, record.price) {
            if (old - new).abs() > PRICE_TOLERANCE {
                result.price_changed = true;
                result.changes.push(FieldChange {
                    field: "price".to_string(),
                    change_type: ChangeType::Changed,
                    old: Some(json!(old)),
                    new: Some(json!(new)),
                    message: format!("Price: ${:.2} -> ${:.2}", old, new),
                });
            }
        }

        // Strict sequence comparison: a reordered gallery is reported as a change.
        if !record.images.is_empty() && existing.images != record.images {
            result.image_changed = true;
            result.changes.push(FieldChange {
                field: "images".to_string(),
                change_type: ChangeType::Changed,
                old: Some(json!(existing.images.len())),
                new: Some(json!(record.images.len())),
                message: format!(
                    "Images updated ({} -> {})",
                    existing.images.len(),
                    record.images.len()
                ),
            });
        }

        let text_fields = [
            ("name", existing.name.as_deref(), Some(record.name.as_str())),
            ("category", existing.category.as_deref(), record.category.as_deref()),
            ("material", existing.material.as_deref(), record.material.as_deref()),
            ("color", existing.color.as_deref(), record.color.as_deref()),
            ("thickness", existing.thickness.as_deref(), record.thickness.as_deref()),
            ("finish", existing.finish.as_deref(), record.finish.as_deref()),
        ];

        for (field, old, new) in text_fields {
            // A value missing from the fresh scrape never counts as a removal.
            let Some(new) = new else {
                continue;
            };
            if old == Some(new) {
                continue;
            }

            result.data_changed = true;
            result.changes.push(FieldChange {
                field: field.to_string(),
                change_type: ChangeType::Changed,
                old: old.map(|v| json!(v)),
                new: Some(json!(new)),
                message: format!("{}: \"{}\" -> \"{}\"", field, old.unwrap_or("(none)"), new),
            });
        }

        result
    }

    /// Catalog entries whose SKU never showed up in `scraped_skus`.
    ///
    /// Only meaningful once the whole sweep has finished.
    pub fn find_missing_products(&self, scraped_skus: &[String]) -> Vec<DiscontinuationCandidate> {
        let seen: HashSet<String> = scraped_skus
            .iter()
            .filter_map(|sku| normalize_sku(sku))
            .collect();

        self.entries
            .iter()
            .filter(|(key, _)| !seen.contains(key))
            .map(|(_, entry)| DiscontinuationCandidate {
                sku: entry.sku.clone(),
                name: entry.name.clone(),
                product_id: entry.id.clone(),
                reason: DiscontinuationReason::NotFoundInScrape,
            })
            .collect()
    }
}
