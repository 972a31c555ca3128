use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{BrowserLauncher, BrowserSession};
use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

// Chrome is torn down if the DevTools connection sees no events for this long
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ChromeLauncher {
    config: ScraperConfig,
}

impl ChromeLauncher {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false) // Often needed in containerized environments
            .window_size(Some((self.config.window_width, self.config.window_height)))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-accelerated-2d-canvas"),
                OsStr::new("--disable-gpu"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        // Set Chrome path if provided
        if let Some(chrome_path) = &self.config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        Ok(launch_options)
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let browser = Browser::new(self.launch_options()?)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;

        info!(
            "Launched headless Chrome ({}x{})",
            self.config.window_width, self.config.window_height
        );

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab,
        }))
    }
}

/// A single Chrome tab. Dropping the browser terminates the Chrome process.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let navigation_error = |e: anyhow::Error| AppError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };

        self.tab.set_default_timeout(timeout);
        self.tab.navigate_to(url).map_err(navigation_error)?;
        self.tab.wait_until_navigated().map_err(navigation_error)?;

        debug!("Loaded {}", self.tab.get_url());
        Ok(())
    }

    async fn content(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| AppError::Browser(format!("Failed to get page content: {}", e)))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> bool {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            // Close tab to free resources
            let _ = self.tab.close(true);
            drop(browser);
            info!("Closed headless Chrome");
        }
        Ok(())
    }
}
