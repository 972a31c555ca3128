use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::{info, warn};

use super::CatalogRepository;
use crate::models::{generate_id, CatalogEntry, DiscontinuationCandidate};
use crate::report::RunSummary;
use crate::utils::error::Result;

const DETECTION_SOURCE: &str = "scraper";

const CREATE_PRODUCTS_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS distributor_products (
        id TEXT PRIMARY KEY,
        vendor_id TEXT NOT NULL,
        sku TEXT NOT NULL,
        name TEXT,
        description TEXT,
        category TEXT,
        material TEXT,
        color TEXT,
        thickness TEXT,
        finish TEXT,
        price TEXT,
        images TEXT NOT NULL DEFAULT '[]',
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

const CREATE_RUNS_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS vendor_scraper_runs (
        id TEXT PRIMARY KEY,
        vendor_id TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at DATETIME NOT NULL,
        completed_at DATETIME,
        products_scraped INTEGER NOT NULL DEFAULT 0,
        products_updated INTEGER NOT NULL DEFAULT 0,
        products_new INTEGER NOT NULL DEFAULT 0,
        products_discontinued INTEGER NOT NULL DEFAULT 0,
        images_downloaded INTEGER NOT NULL DEFAULT 0,
        errors_count INTEGER NOT NULL DEFAULT 0,
        change_summary TEXT NOT NULL
    )
"#;

const CREATE_DISCONTINUATIONS_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS product_discontinuations (
        id TEXT PRIMARY KEY,
        vendor_id TEXT NOT NULL,
        product_sku TEXT NOT NULL,
        product_name TEXT,
        product_id TEXT NOT NULL,
        detection_source TEXT NOT NULL,
        scraper_run_id TEXT NOT NULL,
        detected_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (scraper_run_id) REFERENCES vendor_scraper_runs (id)
    )
"#;

const CREATE_INDEXES_SQL: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_products_vendor_id ON distributor_products (vendor_id);
    CREATE INDEX IF NOT EXISTS idx_runs_vendor_id ON vendor_scraper_runs (vendor_id);
    CREATE INDEX IF NOT EXISTS idx_discontinuations_run_id ON product_discontinuations (scraper_run_id);
"#;

#[derive(Debug, FromRow)]
struct CatalogRow {
    id: String,
    sku: String,
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    material: Option<String>,
    color: Option<String>,
    thickness: Option<String>,
    finish: Option<String>,
    price: Option<String>,
    images: String,
}

impl CatalogRow {
    fn into_entry(self) -> CatalogEntry {
        let price = self.price.as_deref().and_then(|p| match Decimal::from_str(p) {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Ignoring unparseable price '{}' for {}: {}", p, self.sku, e);
                None
            }
        });

        let images = serde_json::from_str(&self.images).unwrap_or_else(|e| {
            warn!("Ignoring malformed image list for {}: {}", self.sku, e);
            Vec::new()
        });

        CatalogEntry {
            id: self.id,
            sku: self.sku,
            name: self.name,
            description: self.description,
            category: self.category,
            material: self.material,
            color: self.color,
            thickness: self.thickness,
            finish: self.finish,
            price,
            images,
        }
    }
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open the database and create the schema if it is missing.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to an in-memory database sees its own empty database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_with(options)
                .await?
        };

        let repository = Self { pool };
        repository.migrate().await?;
        info!("Connected to catalog database");
        Ok(repository)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_PRODUCTS_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_RUNS_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_DISCONTINUATIONS_SQL).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEXES_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert or replace one catalog entry for `vendor_id`.
    pub async fn upsert_entry(&self, vendor_id: &str, entry: &CatalogEntry) -> Result<()> {
        let images = serde_json::to_string(&entry.images)?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO distributor_products
            (id, vendor_id, sku, name, description, category, material, color, thickness, finish, price, images)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&entry.id)
        .bind(vendor_id)
        .bind(&entry.sku)
        .bind(&entry.name)
        .bind(&entry.description)
        .bind(&entry.category)
        .bind(&entry.material)
        .bind(&entry.color)
        .bind(&entry.thickness)
        .bind(&entry.finish)
        .bind(entry.price.map(|p| p.to_string()))
        .bind(images)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for SqliteRepository {
    async fn load_catalog(&self, vendor_id: &str) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r"
            SELECT id, sku, name, description, category, material, color, thickness, finish, price, images
            FROM distributor_products
            WHERE vendor_id = ?
            ORDER BY rowid
            ",
        )
        .bind(vendor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CatalogRow::into_entry).collect())
    }

    async fn save_run(&self, summary: &RunSummary) -> Result<String> {
        let run_id = generate_id();
        let change_summary = serde_json::to_string(summary)?;

        sqlx::query(
            r"
            INSERT INTO vendor_scraper_runs
            (id, vendor_id, status, started_at, completed_at, products_scraped, products_updated,
             products_new, products_discontinued, images_downloaded, errors_count, change_summary)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&run_id)
        .bind(&summary.vendor_id)
        .bind(summary.status)
        .bind(summary.started_at)
        .bind(summary.completed_at)
        .bind(summary.stats.total_scraped as i64)
        .bind(summary.stats.updated_products as i64)
        .bind(summary.stats.new_products as i64)
        .bind(summary.stats.discontinued as i64)
        .bind(summary.stats.images_downloaded as i64)
        .bind(summary.stats.errors as i64)
        .bind(change_summary)
        .execute(&self.pool)
        .await?;

        Ok(run_id)
    }

    async fn save_discontinuations(
        &self,
        run_id: &str,
        vendor_id: &str,
        candidates: &[DiscontinuationCandidate],
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for candidate in candidates {
            sqlx::query(
                r"
                INSERT INTO product_discontinuations
                (id, vendor_id, product_sku, product_name, product_id, detection_source, scraper_run_id)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(generate_id())
            .bind(vendor_id)
            .bind(&candidate.sku)
            .bind(&candidate.name)
            .bind(&candidate.product_id)
            .bind(DETECTION_SOURCE)
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}
