//! Persistence for catalog snapshots and run history, plus image storage.

use async_trait::async_trait;

use crate::models::{CatalogEntry, DiscontinuationCandidate};
use crate::report::RunSummary;
use crate::utils::error::Result;

pub mod archive;
pub mod content;
pub mod memory;
pub mod sqlite;

pub use archive::ImageArchiver;
pub use content::{ContentStore, HttpObjectStore, LocalContentStore};
pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

/// Catalog baseline and run history for every vendor.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn load_catalog(&self, vendor_id: &str) -> Result<Vec<CatalogEntry>>;

    /// Insert the run row and return its id.
    async fn save_run(&self, summary: &RunSummary) -> Result<String>;

    async fn save_discontinuations(
        &self,
        run_id: &str,
        vendor_id: &str,
        candidates: &[DiscontinuationCandidate],
    ) -> Result<()>;
}
