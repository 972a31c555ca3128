use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use url::Url;

use crate::rate_limiter::{RateLimitConfig, MAX_DELAY_MS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub rate_limit: RateLimitConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub reports: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub vendors: HashMap<String, VendorOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub chrome_path: Option<String>,
    pub navigation_timeout_secs: u64,
    pub window_width: u32,
    pub window_height: u32,
    /// Pause between vendors when running `--vendor=all`.
    pub between_vendors_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// No URL means persistence is skipped and only the file report is written.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub bucket: String,
    pub image_timeout_secs: u64,
    /// Archive images to this directory when no endpoint is configured.
    #[serde(default)]
    pub local_dir: Option<String>,
    #[serde(default)]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorOverrides {
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_products_per_category: Option<usize>,
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_dir("config")
    }

    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let layer = |name: &str| dir.join(name).to_string_lossy().into_owned();

        let s = Config::builder()
            .set_default("scraper.user_agent", DEFAULT_USER_AGENT)?
            .set_default("scraper.navigation_timeout_secs", 30)?
            .set_default("scraper.window_width", 1920)?
            .set_default("scraper.window_height", 1080)?
            .set_default("scraper.between_vendors_secs", 10)?
            .set_default("rate_limit.min_delay_ms", 1500)?
            .set_default("rate_limit.max_delay_ms", 3000)?
            .set_default("database.max_connections", 5)?
            .set_default("storage.bucket", "product-images")?
            .set_default("storage.image_timeout_secs", 30)?
            .set_default("reports.dir", "data/scraper-reports")?
            // Start with default configuration
            .add_source(File::with_name(&layer("default")).required(false))
            // Add environment-specific config
            .add_source(File::with_name(&layer(&run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name(&layer("local")).required(false))
            // Add environment variables with prefix "SWEEP_"
            .add_source(Environment::with_prefix("SWEEP").prefix_separator("_").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scraper.navigation_timeout_secs == 0 {
            return Err(ConfigError::Message("Scraper navigation_timeout_secs must be greater than 0".into()));
        }

        if self.scraper.window_width == 0 || self.scraper.window_height == 0 {
            return Err(ConfigError::Message("Scraper window size must be non-zero".into()));
        }

        if self.rate_limit.min_delay_ms > self.rate_limit.max_delay_ms {
            return Err(ConfigError::Message("rate_limit min_delay_ms cannot exceed max_delay_ms".into()));
        }

        if self.rate_limit.max_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::Message(format!(
                "rate_limit max_delay_ms cannot exceed {}",
                MAX_DELAY_MS
            )));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if let Some(endpoint) = &self.storage.endpoint {
            if Url::parse(endpoint).is_err() {
                return Err(ConfigError::Message("Invalid storage endpoint URL format".into()));
            }
            if self.storage.api_key.is_none() {
                return Err(ConfigError::Message("Storage api_key is required when an endpoint is set".into()));
            }
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Message("Storage bucket cannot be empty".into()));
        }

        for (vendor, overrides) in &self.vendors {
            if let (Some(min), Some(max)) = (overrides.min_delay_ms, overrides.max_delay_ms) {
                if min > max {
                    return Err(ConfigError::Message(format!(
                        "vendors.{} min_delay_ms cannot exceed max_delay_ms",
                        vendor
                    )));
                }
            }
            if overrides.min_delay_ms.max(overrides.max_delay_ms).is_some_and(|ms| ms > MAX_DELAY_MS) {
                return Err(ConfigError::Message(format!(
                    "vendors.{} delays cannot exceed {}",
                    vendor, MAX_DELAY_MS
                )));
            }
        }

        Ok(())
    }

    /// Delay bounds for a vendor: config overrides, then the vendor's own
    /// defaults, then the global `rate_limit` section.
    pub fn rate_limit_for(&self, vendor_id: &str, vendor_default: Option<RateLimitConfig>) -> RateLimitConfig {
        let base = vendor_default.unwrap_or_else(|| self.rate_limit.clone());
        match self.vendors.get(vendor_id) {
            Some(overrides) => RateLimitConfig {
                min_delay_ms: overrides.min_delay_ms.unwrap_or(base.min_delay_ms),
                max_delay_ms: overrides.max_delay_ms.unwrap_or(base.max_delay_ms),
            },
            None => base,
        }
    }

    pub fn max_products_for(&self, vendor_id: &str) -> Option<usize> {
        self.vendors
            .get(vendor_id)
            .and_then(|o| o.max_products_per_category)
    }
}
