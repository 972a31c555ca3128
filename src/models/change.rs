use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    New,
    Changed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<serde_json::Value>,
    pub message: String,
}

/// Outcome of comparing one scraped record with its catalog baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult {
    pub sku: String,
    pub name: String,
    pub is_new: bool,
    pub price_changed: bool,
    pub image_changed: bool,
    pub data_changed: bool,
    pub changes: Vec<FieldChange>,
}

impl ChangeResult {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscontinuationReason {
    NotFoundInScrape,
}

impl fmt::Display for DiscontinuationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscontinuationReason::NotFoundInScrape => write!(f, "not observed in scrape"),
        }
    }
}

/// A catalog entry that no page of the current sweep produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscontinuationCandidate {
    pub sku: String,
    pub name: Option<String>,
    pub product_id: String,
    pub reason: DiscontinuationReason,
}
