use super::*;
use catalog_sweep::models::RunStatus;
use catalog_sweep::storage::{CatalogRepository, ContentStore, ImageArchiver, SqliteRepository};
use catalog_sweep::ScrapePipeline;
use mockall::mock;
use mockall::predicate::{always, eq};
use sqlx::Row;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

mock! {
    pub Store {}

    #[async_trait]
    impl ContentStore for Store {
        async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
    }
}

#[tokio::test]
async fn test_sqlite_file_database_across_runs() -> anyhow::Result<()> {
    let db_dir = tempfile::tempdir()?;
    let report_dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", db_dir.path().join("catalog.db").display());

    let repository = Arc::new(SqliteRepository::connect(&url, 2).await?);
    let cdn = "https://cdn.msi.test";
    repository
        .upsert_entry(
            "msi",
            &matching_entry("1", "Q-LAZA", "Calacatta Laza", "Quartz", "White", &format!("{cdn}/img/laza.jpg")),
        )
        .await?;
    repository
        .upsert_entry(
            "msi",
            &matching_entry("2", "M-GONE", "Statuary", "Marble", "White", &format!("{cdn}/img/gone.jpg")),
        )
        .await?;

    let launcher = Arc::new(FakeLauncher::new(msi_site(cdn)));
    let outcome = ScrapePipeline::new(msi(), launcher, options(report_dir.path()))
        .with_repository(repository.clone())
        .run()
        .await?;

    assert_eq!(outcome.report.stats().new_products, 2);
    assert_eq!(outcome.report.stats().updated_products, 0);
    assert_eq!(outcome.report.stats().discontinued, 1);

    // Reopen to read what the run persisted
    let reopened = SqliteRepository::connect(&url, 1).await?;
    let run = sqlx::query("SELECT id, status, products_new, change_summary FROM vendor_scraper_runs")
        .fetch_one(reopened.pool())
        .await?;
    assert_eq!(run.get::<String, _>("status"), "completed");
    assert_eq!(run.get::<i64, _>("products_new"), 2);

    let change_summary: serde_json::Value = serde_json::from_str(&run.get::<String, _>("change_summary"))?;
    assert_eq!(change_summary["summary"]["discontinued"], 1);
    assert!(change_summary.get("changes").is_none());

    let discontinued = sqlx::query("SELECT product_sku, product_id, scraper_run_id FROM product_discontinuations")
        .fetch_all(reopened.pool())
        .await?;
    assert_eq!(discontinued.len(), 1);
    assert_eq!(discontinued[0].get::<String, _>("product_sku"), "M-GONE");
    assert_eq!(discontinued[0].get::<String, _>("product_id"), "2");
    assert_eq!(
        discontinued[0].get::<String, _>("scraper_run_id"),
        run.get::<String, _>("id")
    );

    assert_eq!(reopened.load_catalog("msi").await?.len(), 2);
    assert_eq!(outcome.report.status(), RunStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_stored_run_status_matches_report_file_when_discontinuations_fail() -> anyhow::Result<()> {
    let db_dir = tempfile::tempdir()?;
    let report_dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", db_dir.path().join("catalog.db").display());

    let repository = Arc::new(SqliteRepository::connect(&url, 1).await?);
    repository
        .upsert_entry(
            "msi",
            &matching_entry("9", "M-GONE", "Statuary", "Marble", "White", "https://cdn.msi.test/img/gone.jpg"),
        )
        .await?;
    sqlx::query("DROP TABLE product_discontinuations")
        .execute(repository.pool())
        .await?;

    let launcher = Arc::new(FakeLauncher::new(msi_site("https://cdn.msi.test")));
    let outcome = ScrapePipeline::new(msi(), launcher, options(report_dir.path()))
        .with_repository(repository.clone())
        .run()
        .await?;
    assert_eq!(outcome.report.stats().discontinued, 1);

    let stored: String = sqlx::query("SELECT status FROM vendor_scraper_runs")
        .fetch_one(repository.pool())
        .await?
        .get("status");
    let saved: catalog_sweep::report::FullReport =
        serde_json::from_str(&std::fs::read_to_string(&outcome.report_path)?)?;

    assert_eq!(serde_json::Value::String(stored), serde_json::to_value(saved.summary.status)?);
    assert_eq!(saved.summary.status, RunStatus::Completed);
    assert_eq!(saved.summary.stats.errors, 0);
    Ok(())
}

#[tokio::test]
async fn test_archiver_uploads_once_per_product_image() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
        .mount(&server)
        .await;

    let mut store = MockStore::new();
    for sku in ["Q-LAZA", "Q-MISTE", "G-BLACK"] {
        // wiremock labels raw bytes as octet-stream; the key still gets .jpg
        store
            .expect_upload()
            .with(eq(format!("msi/{sku}.jpg")), always(), eq("application/octet-stream"))
            .times(1)
            .returning(|key, _, _| Ok(format!("https://img.example.com/{key}")));
    }

    let report_dir = tempfile::tempdir()?;
    let archiver = ImageArchiver::new("msi", Arc::new(store), Duration::from_secs(5))?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(&server.uri())));

    let outcome = ScrapePipeline::new(msi(), launcher, options(report_dir.path()))
        .with_archiver(archiver)
        .run()
        .await?;

    assert_eq!(outcome.report.stats().images_downloaded, 3);
    Ok(())
}

#[tokio::test]
async fn test_upload_failure_is_not_a_run_error() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png").set_body_bytes(vec![1u8]))
        .mount(&server)
        .await;

    let mut store = MockStore::new();
    store
        .expect_upload()
        .returning(|_, _, _| Err(AppError::Storage("bucket full".to_string())));

    let report_dir = tempfile::tempdir()?;
    let archiver = ImageArchiver::new("msi", Arc::new(store), Duration::from_secs(5))?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(&server.uri())));

    let outcome = ScrapePipeline::new(msi(), launcher, options(report_dir.path()))
        .with_archiver(archiver)
        .run()
        .await?;

    assert_eq!(outcome.report.stats().total_scraped, 3);
    assert_eq!(outcome.report.stats().images_downloaded, 0);
    assert_eq!(outcome.report.stats().errors, 0);
    Ok(())
}
