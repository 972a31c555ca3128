//! Run statistics, the compact run summary, and the replayable JSON report.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::{ChangeResult, DiscontinuationCandidate, RunStatus};
use crate::utils::error::{AppError, Result};

const CONSOLE_CHANGES: usize = 20;
const CONSOLE_DISCONTINUED: usize = 10;
const CONSOLE_ERRORS: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStats {
    pub total_scraped: u64,
    pub new_products: u64,
    pub updated_products: u64,
    pub discontinued: u64,
    pub errors: u64,
    pub images_downloaded: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryCounts {
    pub total: u64,
    pub new: u64,
    pub updated: u64,
    pub discontinued: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub stack: Option<String>,
}

/// Compact run row, without per-product detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub vendor_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub status: RunStatus,
    pub stats: RunStats,
    pub summary: SummaryCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullReport {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub changes: Vec<ChangeResult>,
    pub discontinued: Vec<DiscontinuationCandidate>,
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone)]
pub struct ReportGenerator {
    vendor_id: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    stats: RunStats,
    changes: Vec<ChangeResult>,
    discontinued: Vec<DiscontinuationCandidate>,
    errors: Vec<ErrorEntry>,
    fatal: bool,
}

impl ReportGenerator {
    pub fn new(vendor_id: impl Into<String>) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            stats: RunStats::default(),
            changes: Vec::new(),
            discontinued: Vec::new(),
            errors: Vec::new(),
            fatal: false,
        }
    }

    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn changes(&self) -> &[ChangeResult] {
        &self.changes
    }

    pub fn discontinued(&self) -> &[DiscontinuationCandidate] {
        &self.discontinued
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Unchanged records are counted but not stored.
    pub fn record_product(&mut self, change: ChangeResult) {
        self.stats.total_scraped += 1;

        if change.is_new {
            self.stats.new_products += 1;
        } else if change.has_changes() {
            self.stats.updated_products += 1;
        }

        if change.has_changes() {
            self.changes.push(change);
        }
    }

    pub fn record_error(&mut self, error: &AppError) {
        self.stats.errors += 1;
        self.errors.push(ErrorEntry {
            timestamp: Utc::now(),
            message: error.to_string(),
            stack: error.cause_chain(),
        });
    }

    /// Record the error that ended the run; the status becomes `failed`.
    pub fn record_fatal(&mut self, error: &AppError) {
        self.record_error(error);
        self.fatal = true;
    }

    pub fn record_discontinued(&mut self, candidate: DiscontinuationCandidate) {
        self.stats.discontinued += 1;
        self.discontinued.push(candidate);
    }

    pub fn record_image_download(&mut self) {
        self.stats.images_downloaded += 1;
    }

    /// Seal the run. Only the first call stamps `completed_at`.
    pub fn complete(&mut self) {
        if self.completed_at.is_some() {
            warn!("[{}] Report already completed; ignoring", self.vendor_id);
            return;
        }
        self.completed_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> i64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        ((end - self.started_at).num_milliseconds() as f64 / 1000.0).round() as i64
    }

    pub fn status(&self) -> RunStatus {
        if self.fatal {
            RunStatus::Failed
        } else if self.stats.errors > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            vendor_id: self.vendor_id.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_seconds: self.duration_seconds(),
            status: self.status(),
            stats: self.stats.clone(),
            summary: SummaryCounts {
                total: self.stats.total_scraped,
                new: self.stats.new_products,
                updated: self.stats.updated_products,
                discontinued: self.stats.discontinued,
                errors: self.stats.errors,
            },
        }
    }

    pub fn full_report(&self) -> FullReport {
        FullReport {
            summary: self.summary(),
            changes: self.changes.clone(),
            discontinued: self.discontinued.clone(),
            errors: self.errors.clone(),
        }
    }

    /// `{vendor_id}-{started_at}.json` with `:` and `.` in the timestamp replaced by `-`.
    pub fn file_name(&self) -> String {
        let timestamp = self
            .started_at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        format!("{}-{}.json", self.vendor_id, timestamp)
    }

    pub fn save_to_file(&self, output_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join(self.file_name());
        let json = serde_json::to_string_pretty(&self.full_report())?;
        std::fs::write(&path, json)?;

        Ok(path)
    }

    pub fn to_console(&self) -> String {
        let duration = self.duration_seconds();
        let rule = "=".repeat(40);
        let mut out = String::new();

        let _ = writeln!(out, "\n{}", rule);
        let _ = writeln!(out, "Scraper Report: {}", self.vendor_id.to_uppercase());
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Duration: {}m {}s", duration / 60, duration % 60);
        let _ = writeln!(out, "Status: {}", self.status().label());
        let _ = writeln!(out, "\nSTATISTICS:");
        let _ = writeln!(out, "  Total Scraped:     {}", self.stats.total_scraped);
        let _ = writeln!(out, "  New Products:      {}", self.stats.new_products);
        let _ = writeln!(out, "  Updated Products:  {}", self.stats.updated_products);
        let _ = writeln!(out, "  Discontinued:      {}", self.stats.discontinued);
        let _ = writeln!(out, "  Images Downloaded: {}", self.stats.images_downloaded);
        let _ = writeln!(out, "  Errors:            {}", self.stats.errors);

        if !self.changes.is_empty() {
            let _ = writeln!(out, "\nCHANGES DETECTED ({}):", self.changes.len());
            for change in self.changes.iter().take(CONSOLE_CHANGES) {
                let messages: Vec<&str> = change.changes.iter().map(|c| c.message.as_str()).collect();
                let _ = writeln!(out, "  - {}: {}", change.sku, messages.join("; "));
            }
            write_overflow(&mut out, self.changes.len(), CONSOLE_CHANGES);
        }

        if !self.discontinued.is_empty() {
            let _ = writeln!(out, "\nPOTENTIALLY DISCONTINUED ({}):", self.discontinued.len());
            for product in self.discontinued.iter().take(CONSOLE_DISCONTINUED) {
                let _ = writeln!(out, "  - {}: {}", product.sku, product.name.as_deref().unwrap_or("(unnamed)"));
            }
            write_overflow(&mut out, self.discontinued.len(), CONSOLE_DISCONTINUED);
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "\nERRORS ({}):", self.errors.len());
            for error in self.errors.iter().take(CONSOLE_ERRORS) {
                let _ = writeln!(out, "  - {}", error.message);
            }
            write_overflow(&mut out, self.errors.len(), CONSOLE_ERRORS);
        }

        let _ = writeln!(out, "\n{}", rule);
        out
    }
}

fn write_overflow(out: &mut String, total: usize, shown: usize) {
    if total > shown {
        let _ = writeln!(out, "  ... and {} more", total - shown);
    }
}
