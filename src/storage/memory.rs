use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::CatalogRepository;
use crate::models::{generate_id, CatalogEntry, DiscontinuationCandidate};
use crate::report::RunSummary;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDiscontinuation {
    pub run_id: String,
    pub vendor_id: String,
    pub candidate: DiscontinuationCandidate,
}

/// Process-local repository for dry runs and tests.
#[derive(Default)]
pub struct InMemoryRepository {
    catalogs: Mutex<HashMap<String, Vec<CatalogEntry>>>,
    runs: Mutex<Vec<(String, RunSummary)>>,
    discontinuations: Mutex<Vec<StoredDiscontinuation>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, vendor_id: &str, entries: Vec<CatalogEntry>) -> Self {
        self.lock_catalogs().insert(vendor_id.to_string(), entries);
        self
    }

    /// Make every subsequent `load_catalog` fail.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent save fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn runs(&self) -> Vec<(String, RunSummary)> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn discontinuations(&self) -> Vec<StoredDiscontinuation> {
        self.discontinuations
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    fn lock_catalogs(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<CatalogEntry>>> {
        self.catalogs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_saves(&self) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::Storage("in-memory repository rejected the write".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn load_catalog(&self, vendor_id: &str) -> Result<Vec<CatalogEntry>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AppError::Storage(format!("catalog for {} is unavailable", vendor_id)));
        }
        Ok(self.lock_catalogs().get(vendor_id).cloned().unwrap_or_default())
    }

    async fn save_run(&self, summary: &RunSummary) -> Result<String> {
        self.check_saves()?;
        let run_id = generate_id();
        self.runs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((run_id.clone(), summary.clone()));
        Ok(run_id)
    }

    async fn save_discontinuations(
        &self,
        run_id: &str,
        vendor_id: &str,
        candidates: &[DiscontinuationCandidate],
    ) -> Result<()> {
        self.check_saves()?;
        let mut stored = self
            .discontinuations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        stored.extend(candidates.iter().map(|candidate| StoredDiscontinuation {
            run_id: run_id.to_string(),
            vendor_id: vendor_id.to_string(),
            candidate: candidate.clone(),
        }));
        Ok(())
    }
}
