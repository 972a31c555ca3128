use anyhow::{bail, Context, Result};
use catalog_sweep::browser::{BrowserLauncher, ChromeLauncher};
use catalog_sweep::config::{AppConfig, LoggingConfig};
use catalog_sweep::report::RunSummary;
use catalog_sweep::storage::{CatalogRepository, ContentStore, HttpObjectStore, ImageArchiver, LocalContentStore, SqliteRepository};
use catalog_sweep::vendors::{VendorRegistry, VendorScraper};
use catalog_sweep::{PipelineOptions, ScrapePipeline};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const ALL_VENDORS: &str = "all";

#[derive(Parser)]
#[command(name = "catalog-sweep", version, about = "Scrape vendor catalogs and report what changed")]
struct Cli {
    /// Directory holding default, RUN_MODE and local config files
    #[arg(long, global = true, default_value = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one vendor, every vendor, or list the available vendors
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Vendor id, or `all`
    #[arg(long, required_unless_present = "list", conflicts_with = "list")]
    vendor: Option<String>,

    /// List available vendors and exit
    #[arg(long)]
    list: bool,

    /// Skip the catalog database and image archival; the report file is still written
    #[arg(long)]
    dry_run: bool,
}

/// Shared services for every vendor run in this process.
struct Services {
    launcher: Arc<dyn BrowserLauncher>,
    repository: Option<Arc<dyn CatalogRepository>>,
    content_store: Option<Arc<dyn ContentStore>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let registry = VendorRegistry::with_defaults();

    let Command::Run(args) = cli.command;

    if args.list {
        print_vendors(&registry);
        return Ok(());
    }

    let vendor = args.vendor.unwrap_or_default();
    let scraper = match vendor.as_str() {
        ALL_VENDORS => None,
        id => Some(registry.get(id)?),
    };

    let config = AppConfig::from_dir(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let _log_guard = init_tracing(&config.logging)?;

    let services = build_services(&config, args.dry_run).await?;

    match scraper {
        Some(scraper) => {
            run_vendor(scraper, &config, &services).await?;
            Ok(())
        }
        None => run_all(&registry, &config, &services).await,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive("catalog_sweep=info".parse()?);

    match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "catalog-sweep.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn build_services(config: &AppConfig, dry_run: bool) -> Result<Services> {
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(ChromeLauncher::new(config.scraper.clone()));

    if dry_run {
        info!("Dry run: catalog database and image archival disabled");
        return Ok(Services {
            launcher,
            repository: None,
            content_store: None,
        });
    }

    let repository = open_repository(config).await;

    let storage = &config.storage;
    let timeout = Duration::from_secs(storage.image_timeout_secs);
    let content_store: Option<Arc<dyn ContentStore>> = match (&storage.endpoint, &storage.api_key, &storage.local_dir) {
        (Some(endpoint), Some(api_key), _) => Some(Arc::new(HttpObjectStore::new(
            endpoint,
            api_key.clone(),
            storage.bucket.clone(),
            timeout,
        )?)),
        (None, _, Some(dir)) => Some(Arc::new(LocalContentStore::new(dir, storage.public_base_url.clone()))),
        _ => None,
    };

    Ok(Services {
        launcher,
        repository,
        content_store,
    })
}

/// The catalog database, or `None` when it is not configured or cannot be opened.
/// Runs without it still scrape and write their report file.
async fn open_repository(config: &AppConfig) -> Option<Arc<dyn CatalogRepository>> {
    let url = config.database.url.as_deref()?;

    match SqliteRepository::connect(url, config.database.max_connections).await {
        Ok(repository) => Some(Arc::new(repository)),
        Err(e) => {
            warn!("Failed to open catalog database, skipping persistence: {}", e);
            None
        }
    }
}

async fn run_vendor(vendor: Arc<dyn VendorScraper>, config: &AppConfig, services: &Services) -> Result<RunSummary> {
    let options = PipelineOptions::from_config(config, vendor.as_ref());
    let mut pipeline = ScrapePipeline::new(vendor.clone(), services.launcher.clone(), options);

    if let Some(repository) = &services.repository {
        pipeline = pipeline.with_repository(repository.clone());
    }
    if let Some(store) = &services.content_store {
        let timeout = Duration::from_secs(config.storage.image_timeout_secs);
        pipeline = pipeline.with_archiver(ImageArchiver::new(vendor.id(), store.clone(), timeout)?);
    }

    let outcome = pipeline
        .run()
        .await
        .with_context(|| format!("Vendor {} failed", vendor.id()))?;

    println!("{}", outcome.report.to_console());
    Ok(outcome.report.summary())
}

async fn run_all(registry: &VendorRegistry, config: &AppConfig, services: &Services) -> Result<()> {
    let vendors = registry.all();
    let mut results = Vec::with_capacity(vendors.len());

    for (index, vendor) in vendors.into_iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(Duration::from_secs(config.scraper.between_vendors_secs)).await;
        }

        let id = vendor.id().to_string();
        let result = run_vendor(vendor, config, services).await;
        if let Err(e) = &result {
            error!("{:#}", e);
        }
        results.push((id, result));
    }

    println!("\n{}", "=".repeat(60));
    println!("ALL VENDORS SUMMARY");
    println!("{}", "=".repeat(60));
    for (id, result) in &results {
        match result {
            Ok(summary) => println!(
                "{:<12} {:<22} scraped={} new={} updated={} discontinued={} errors={}",
                id,
                summary.status.label(),
                summary.stats.total_scraped,
                summary.stats.new_products,
                summary.stats.updated_products,
                summary.stats.discontinued,
                summary.stats.errors
            ),
            Err(e) => println!("{:<12} {:<22} {}", id, "Failed", e),
        }
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        bail!("{} of {} vendors failed", failed, results.len());
    }
    Ok(())
}

fn print_vendors(registry: &VendorRegistry) {
    println!("Available vendors:");
    for vendor in registry.list() {
        println!("  {:<10} {} ({})", vendor.id, vendor.name, vendor.base_url);
    }
}
