use super::*;
use catalog_sweep::models::RunStatus;
use catalog_sweep::report::FullReport;
use catalog_sweep::storage::{ImageArchiver, InMemoryRepository, LocalContentStore};
use catalog_sweep::ScrapePipeline;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CDN: &str = "https://cdn.msi.test";

fn read_report(path: &Path) -> FullReport {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_first_run_reports_every_product_as_new() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(CDN)));
    let repository = Arc::new(InMemoryRepository::new());

    let outcome = ScrapePipeline::new(msi(), launcher.clone(), options(dir.path()))
        .with_repository(repository.clone())
        .run()
        .await?;

    let stats = outcome.report.stats();
    assert_eq!(stats.total_scraped, 3);
    assert_eq!(stats.new_products, 3);
    assert_eq!(stats.updated_products, 0);
    assert_eq!(stats.errors, 0);
    assert_eq!(outcome.report.status(), RunStatus::Completed);

    // 5 listings + 3 product pages, fragments never followed
    let navigations = launcher.counters.navigations();
    assert_eq!(navigations.len(), 8);
    assert!(navigations.iter().all(|url| !url.contains('#')));

    let saved = read_report(&outcome.report_path);
    assert_eq!(saved.summary.status, RunStatus::Completed);
    assert_eq!(saved.changes.len(), 3);
    assert!(saved.changes.iter().all(|c| c.is_new));

    let runs = repository.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].1.stats.new_products, 3);

    assert_eq!(launcher.counters.launches(), 1);
    assert_eq!(launcher.counters.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_changes_and_discontinuations_against_catalog() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(CDN)));

    let mut recolored = matching_entry("2", "Q-MISTE", "Carrara Miste", "Quartz", "Grey", &format!("{CDN}/img/miste.jpg"));
    recolored.color = Some("Charcoal".to_string());

    let catalog = vec![
        matching_entry("1", "Q-LAZA", "Calacatta Laza", "Quartz", "White", &format!("{CDN}/img/laza.jpg")),
        recolored,
        matching_entry("3", "G-RETIRED", "Retired Granite", "Granite", "Red", &format!("{CDN}/img/old.jpg")),
    ];
    let repository = Arc::new(InMemoryRepository::new().with_catalog("msi", catalog));

    let outcome = ScrapePipeline::new(msi(), launcher.clone(), options(dir.path()))
        .with_repository(repository.clone())
        .run()
        .await?;

    let report = &outcome.report;
    assert_eq!(report.stats().total_scraped, 3);
    assert_eq!(report.stats().new_products, 1);
    assert_eq!(report.stats().updated_products, 1);
    assert_eq!(report.stats().discontinued, 1);

    // The unchanged product is counted but not listed
    let skus: Vec<&str> = report.changes().iter().map(|c| c.sku.as_str()).collect();
    assert_eq!(skus, vec!["Q-MISTE", "G-BLACK"]);

    let miste = &report.changes()[0];
    assert!(miste.data_changed);
    assert!(!miste.price_changed);
    assert_eq!(miste.changes[0].message, r#"color: "Charcoal" -> "Grey""#);

    assert_eq!(report.discontinued()[0].sku, "G-RETIRED");
    assert_eq!(report.discontinued()[0].product_id, "3");

    let runs = repository.runs();
    let stored = repository.discontinuations();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].run_id, runs[0].0);
    assert_eq!(stored[0].vendor_id, "msi");
    assert_eq!(stored[0].candidate.sku, "G-RETIRED");
    Ok(())
}

#[tokio::test]
async fn test_product_failure_is_recorded_and_sweep_continues() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let site = msi_site(CDN).failing(&format!("{BASE}/quartz/carrara-miste/"));
    let launcher = Arc::new(FakeLauncher::new(site));

    let outcome = ScrapePipeline::new(msi(), launcher.clone(), options(dir.path()))
        .run()
        .await?;

    let report = &outcome.report;
    assert_eq!(report.stats().total_scraped, 2);
    assert_eq!(report.stats().errors, 1);
    assert_eq!(report.status(), RunStatus::CompletedWithErrors);
    assert!(report.errors()[0].message.contains("carrara-miste"));

    let saved = read_report(&outcome.report_path);
    assert_eq!(saved.summary.status, RunStatus::CompletedWithErrors);
    assert_eq!(saved.errors.len(), 1);
    assert_eq!(launcher.counters.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_category_failure_is_recorded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let site = msi_site(CDN).failing(&format!("{BASE}/natural-stone-granite"));
    let launcher = Arc::new(FakeLauncher::new(site));

    let outcome = ScrapePipeline::new(msi(), launcher, options(dir.path())).run().await?;

    assert_eq!(outcome.report.stats().total_scraped, 2);
    assert_eq!(outcome.report.stats().errors, 1);
    Ok(())
}

#[tokio::test]
async fn test_page_without_sku_is_skipped_silently() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let site = msi_site(CDN)
        .page(&format!("{BASE}/natural-stone-marble"), listing(&["/marble/"]))
        .page(&format!("{BASE}/marble/"), "<html><body><p>Coming soon</p></body></html>");
    let launcher = Arc::new(FakeLauncher::new(site));

    let outcome = ScrapePipeline::new(msi(), launcher, options(dir.path())).run().await?;

    assert_eq!(outcome.report.stats().total_scraped, 3);
    assert_eq!(outcome.report.stats().errors, 0);
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_writes_failed_report() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::failing());

    let result = ScrapePipeline::new(msi(), launcher.clone(), options(dir.path())).run().await;
    assert!(matches!(result, Err(AppError::Browser(_))));

    let files: Vec<_> = std::fs::read_dir(dir.path())?.collect::<std::io::Result<_>>()?;
    assert_eq!(files.len(), 1);

    let saved = read_report(&files[0].path());
    assert_eq!(saved.summary.status, RunStatus::Failed);
    assert!(saved.summary.completed_at.is_some());
    assert_eq!(saved.errors.len(), 1);
    assert!(saved.errors[0].message.contains("no chrome binary"));

    // Cleanup still runs, but there is no browser to close
    assert_eq!(launcher.counters.launches(), 0);
    assert_eq!(launcher.counters.closes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_catalog_load_failure_continues_with_empty_catalog() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(CDN)));
    let repository = Arc::new(InMemoryRepository::new());
    repository.fail_loads(true);

    let outcome = ScrapePipeline::new(msi(), launcher, options(dir.path()))
        .with_repository(repository)
        .run()
        .await?;

    assert_eq!(outcome.report.stats().new_products, 3);
    assert_eq!(outcome.report.stats().errors, 1);
    assert_eq!(outcome.report.status(), RunStatus::CompletedWithErrors);
    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_still_writes_report() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(CDN)));
    let repository = Arc::new(InMemoryRepository::new());
    repository.fail_saves(true);

    let outcome = ScrapePipeline::new(msi(), launcher.clone(), options(dir.path()))
        .with_repository(repository.clone())
        .run()
        .await?;

    assert!(repository.runs().is_empty());
    let saved = read_report(&outcome.report_path);
    assert_eq!(saved.summary.stats.errors, 0);
    assert!(saved.errors.is_empty());
    assert_eq!(saved.summary.status, RunStatus::Completed);
    assert_eq!(outcome.report.status(), RunStatus::Completed);
    assert_eq!(launcher.counters.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_max_products_per_category() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(CDN)));
    let mut opts = options(dir.path());
    opts.max_products_per_category = Some(1);

    let outcome = ScrapePipeline::new(msi(), launcher, opts).run().await?;

    let skus: Vec<&str> = outcome.report.changes().iter().map(|c| c.sku.as_str()).collect();
    assert_eq!(skus, vec!["Q-LAZA", "G-BLACK"]);
    Ok(())
}

#[tokio::test]
async fn test_rate_limiter_spaces_navigations() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(CDN)));
    let mut opts = options(dir.path());
    opts.rate_limit = catalog_sweep::rate_limiter::RateLimitConfig {
        min_delay_ms: 20,
        max_delay_ms: 20,
    };

    let start = std::time::Instant::now();
    ScrapePipeline::new(msi(), launcher, opts).run().await?;

    // 8 navigations, the first one unpaced
    assert!(start.elapsed() >= Duration::from_millis(7 * 20));
    Ok(())
}

#[tokio::test]
async fn test_images_are_archived() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/laza.jpg"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/jpeg").set_body_bytes(vec![1u8, 2]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/black.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png").set_body_bytes(vec![3u8]))
        .mount(&server)
        .await;
    // miste.jpg is not mounted: the 404 is logged, not recorded

    let dir = tempfile::tempdir()?;
    let store_dir = tempfile::tempdir()?;
    let store = Arc::new(LocalContentStore::new(store_dir.path(), Some("https://img.example.com".to_string())));
    let archiver = ImageArchiver::new("msi", store, Duration::from_secs(5))?;
    let launcher = Arc::new(FakeLauncher::new(msi_site(&server.uri())));

    let outcome = ScrapePipeline::new(msi(), launcher, options(dir.path()))
        .with_archiver(archiver)
        .run()
        .await?;

    assert_eq!(outcome.report.stats().images_downloaded, 2);
    assert_eq!(outcome.report.stats().errors, 0);
    assert_eq!(std::fs::read(store_dir.path().join("msi/Q-LAZA.jpg"))?, vec![1, 2]);
    assert_eq!(std::fs::read(store_dir.path().join("msi/G-BLACK.png"))?, vec![3]);
    assert!(!store_dir.path().join("msi/Q-MISTE.jpg").exists());
    Ok(())
}
