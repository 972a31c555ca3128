//! One vendor run: launch, load the baseline, sweep, detect, report, clean up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::browser::{BrowserLauncher, ExtractionSession};
use crate::change_detector::ChangeDetector;
use crate::config::AppConfig;
use crate::models::{CatalogEntry, ProductRecord};
use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::report::ReportGenerator;
use crate::storage::{CatalogRepository, ImageArchiver};
use crate::utils::error::{AppError, Result};
use crate::vendors::{Category, VendorScraper};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub report_dir: PathBuf,
    pub navigation_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub max_products_per_category: Option<usize>,
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig, vendor: &dyn VendorScraper) -> Self {
        Self {
            report_dir: PathBuf::from(&config.reports.dir),
            navigation_timeout: Duration::from_secs(config.scraper.navigation_timeout_secs),
            rate_limit: config.rate_limit_for(vendor.id(), vendor.rate_limit()),
            max_products_per_category: config.max_products_for(vendor.id()),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: ReportGenerator,
    pub report_path: PathBuf,
}

pub struct ScrapePipeline {
    vendor: Arc<dyn VendorScraper>,
    launcher: Arc<dyn BrowserLauncher>,
    repository: Option<Arc<dyn CatalogRepository>>,
    archiver: Option<ImageArchiver>,
    options: PipelineOptions,
}

impl ScrapePipeline {
    pub fn new(vendor: Arc<dyn VendorScraper>, launcher: Arc<dyn BrowserLauncher>, options: PipelineOptions) -> Self {
        Self {
            vendor,
            launcher,
            repository: None,
            archiver: None,
            options,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn CatalogRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_archiver(mut self, archiver: ImageArchiver) -> Self {
        self.archiver = Some(archiver);
        self
    }

    fn vendor_id(&self) -> &str {
        self.vendor.id()
    }

    /// Run the vendor end to end.
    ///
    /// Per-product and per-category failures are recorded in the report and the
    /// sweep continues. A browser launch failure, or failing to write the report
    /// file, ends the run with a `failed` report and returns the error.
    pub async fn run(&self) -> Result<RunOutcome> {
        let mut report = ReportGenerator::new(self.vendor_id());
        info!("[{}] Initializing scraper...", self.vendor_id());

        let page = match self.launcher.launch().await {
            Ok(page) => page,
            Err(e) => {
                let e = self.fail(&mut report, e);
                self.cleanup(None).await;
                return Err(e);
            }
        };
        let mut session = ExtractionSession::new(
            page,
            RateLimiter::new(self.options.rate_limit.clone()),
            self.options.navigation_timeout,
        );

        let detector = ChangeDetector::new(self.load_catalog(&mut report).await);
        info!("[{}] Initialization complete", self.vendor_id());

        let scraped_skus = self.scrape(&mut session, &detector, &mut report).await;
        self.detect_discontinued(&detector, &scraped_skus, &mut report);

        report.complete();
        self.persist(&report).await;
        let saved = report.save_to_file(&self.options.report_dir);

        self.cleanup(Some(&mut session)).await;

        match saved {
            Ok(report_path) => {
                info!("[{}] Report saved to: {}", self.vendor_id(), report_path.display());
                Ok(RunOutcome { report, report_path })
            }
            Err(e) => {
                error!("[{}] Failed to write report: {}", self.vendor_id(), e);
                report.record_fatal(&e);
                Err(e)
            }
        }
    }

    fn fail(&self, report: &mut ReportGenerator, e: AppError) -> AppError {
        error!("[{}] Scraper error: {}", self.vendor_id(), e);
        report.record_fatal(&e);
        report.complete();

        match report.save_to_file(&self.options.report_dir) {
            Ok(path) => info!("[{}] Failure report saved to: {}", self.vendor_id(), path.display()),
            Err(save_err) => warn!("[{}] Could not write failure report: {}", self.vendor_id(), save_err),
        }
        e
    }

    async fn load_catalog(&self, report: &mut ReportGenerator) -> Vec<CatalogEntry> {
        let Some(repository) = &self.repository else {
            info!("[{}] No catalog database, skipping existing products load", self.vendor_id());
            return Vec::new();
        };

        match repository.load_catalog(self.vendor_id()).await {
            Ok(entries) => {
                info!("[{}] Loaded {} existing products", self.vendor_id(), entries.len());
                entries
            }
            Err(e) => {
                warn!("[{}] Error loading existing products: {}", self.vendor_id(), e);
                report.record_error(&e);
                Vec::new()
            }
        }
    }

    async fn scrape(
        &self,
        session: &mut ExtractionSession,
        detector: &ChangeDetector,
        report: &mut ReportGenerator,
    ) -> Vec<String> {
        let mut scraped_skus = Vec::new();

        for category in self.vendor.categories() {
            info!("[{}] Scraping category: {}", self.vendor_id(), category.name);
            if let Err(e) = self
                .scrape_category(session, category, detector, report, &mut scraped_skus)
                .await
            {
                warn!("[{}] Error scraping category {}: {}", self.vendor_id(), category.name, e);
                report.record_error(&e);
            }
        }

        info!(
            "[{}] Scrape complete. {} products found.",
            self.vendor_id(),
            scraped_skus.len()
        );
        scraped_skus
    }

    async fn scrape_category(
        &self,
        session: &mut ExtractionSession,
        category: &Category,
        detector: &ChangeDetector,
        report: &mut ReportGenerator,
        scraped_skus: &mut Vec<String>,
    ) -> Result<()> {
        let url = self.vendor.category_url(category)?;
        session.navigate_to(&url).await?;

        let mut links = self.vendor.product_links(session.page(), category).await?;
        if let Some(max) = self.options.max_products_per_category {
            links.truncate(max);
        }
        info!("[{}] Found {} products in {}", self.vendor_id(), links.len(), category.name);

        for link in links {
            match self.scrape_product(session, &link, category, detector, report).await {
                Ok(Some(sku)) => scraped_skus.push(sku),
                Ok(None) => {}
                Err(e) => {
                    warn!("[{}] Error scraping {}: {}", self.vendor_id(), link, e);
                    report.record_error(&e);
                }
            }
        }

        Ok(())
    }

    /// Returns the SKU when a record was built.
    async fn scrape_product(
        &self,
        session: &mut ExtractionSession,
        link: &str,
        category: &Category,
        detector: &ChangeDetector,
        report: &mut ReportGenerator,
    ) -> Result<Option<String>> {
        session.navigate_to(link).await?;

        let raw = self.vendor.extract(session.page()).await?;
        let main_image = raw.main_image.clone();

        let Some(mut record) = ProductRecord::from_raw(raw, &category.name, link)? else {
            info!("[{}] Skipping product - missing name or SKU: {}", self.vendor_id(), link);
            return Ok(None);
        };

        if let (Some(archiver), Some(image_url)) = (&self.archiver, main_image) {
            match archiver.archive(&image_url, &record.sku).await {
                Ok(archived_url) => {
                    report.record_image_download();
                    record = record.with_archived_image(archived_url);
                }
                Err(e) => warn!("[{}] Error downloading image {}: {}", self.vendor_id(), image_url, e),
            }
        }

        let change = detector.detect_changes(&record);
        if change.has_changes() {
            let label = if change.is_new { "NEW" } else { "UPDATED" };
            info!("[{}] {}: {}", self.vendor_id(), record.sku, label);
        }
        report.record_product(change);

        Ok(Some(record.sku))
    }

    fn detect_discontinued(&self, detector: &ChangeDetector, scraped_skus: &[String], report: &mut ReportGenerator) {
        if scraped_skus.is_empty() && detector.catalog_size() > 0 {
            warn!(
                "[{}] No products scraped; every catalog entry will be flagged as discontinued",
                self.vendor_id()
            );
        }

        for candidate in detector.find_missing_products(scraped_skus) {
            report.record_discontinued(candidate);
        }
    }

    /// Save the completed run. Failures are logged only; the report is sealed
    /// so the stored row and the report file carry the same status.
    async fn persist(&self, report: &ReportGenerator) {
        let Some(repository) = &self.repository else {
            info!("[{}] No catalog database, skipping save", self.vendor_id());
            return;
        };

        let run_id = match repository.save_run(&report.summary()).await {
            Ok(run_id) => run_id,
            Err(e) => {
                warn!("[{}] Error saving run: {}", self.vendor_id(), e);
                return;
            }
        };
        info!("[{}] Saved scraper run: {}", self.vendor_id(), run_id);

        let discontinued = report.discontinued();
        if discontinued.is_empty() {
            return;
        }

        if let Err(e) = repository
            .save_discontinuations(&run_id, self.vendor_id(), discontinued)
            .await
        {
            warn!("[{}] Error saving discontinuations: {}", self.vendor_id(), e);
        }
    }

    async fn cleanup(&self, session: Option<&mut ExtractionSession>) {
        let Some(session) = session else {
            info!("[{}] No browser session to close", self.vendor_id());
            return;
        };

        let stats = session.rate_limiter().stats();
        info!(
            "[{}] {} requests, {} errors ({}%)",
            self.vendor_id(),
            stats.request_count,
            stats.errors,
            stats.error_rate_percent
        );

        if let Err(e) = session.close().await {
            warn!("[{}] Error closing browser: {}", self.vendor_id(), e);
        }
    }
}
