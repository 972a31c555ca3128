//! Page access for vendor strategies.
//!
//! Strategies only see [`BrowserSession`]; the Chrome adapter lives in
//! [`chrome`] and tests substitute static pages.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

use crate::rate_limiter::RateLimiter;
use crate::utils::error::{AppError, Result};

pub mod chrome;

pub use chrome::{ChromeLauncher, ChromeSession};

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// One open page in a headless browser.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Serialized DOM of the current page.
    async fn content(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Whether `selector` matched before `timeout` ran out.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> bool;

    async fn close(&mut self) -> Result<()>;

    /// Trimmed text of the first element matching `selector`.
    async fn extract_field(&self, selector: &str) -> Result<Option<String>> {
        let html = self.content().await?;
        select_text(&html, selector)
    }

    /// Text (or `attribute`, when given) of every element matching `selector`.
    async fn extract_all(&self, selector: &str, attribute: Option<&str>) -> Result<Vec<String>> {
        let html = self.content().await?;
        select_all(&html, selector, attribute)
    }
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Extraction(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

pub fn element_text(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn select_text(html: &str, selector: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let css_selector = parse_selector(selector)?;

    Ok(document
        .select(&css_selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty()))
}

fn select_all(html: &str, selector: &str, attribute: Option<&str>) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let css_selector = parse_selector(selector)?;

    let values = document
        .select(&css_selector)
        .filter_map(|element| match attribute {
            Some(name) => element.value().attr(name).map(|v| v.trim().to_string()),
            None => Some(element_text(element)),
        })
        .filter(|value| !value.is_empty())
        .collect();

    Ok(values)
}

/// A page paired with the rate limiter that paces it.
pub struct ExtractionSession {
    page: Box<dyn BrowserSession>,
    rate_limiter: RateLimiter,
    navigation_timeout: Duration,
}

impl ExtractionSession {
    pub fn new(page: Box<dyn BrowserSession>, rate_limiter: RateLimiter, navigation_timeout: Duration) -> Self {
        Self {
            page,
            rate_limiter,
            navigation_timeout,
        }
    }

    /// Wait out the rate limiter, then navigate. Failures count against the limiter.
    pub async fn navigate_to(&mut self, url: &str) -> Result<()> {
        self.rate_limiter.wait().await;
        debug!("Navigating to {}", url);

        if let Err(e) = self.page.navigate(url, self.navigation_timeout).await {
            self.rate_limiter.record_error();
            return Err(e);
        }
        Ok(())
    }

    pub fn page(&self) -> &dyn BrowserSession {
        self.page.as_ref()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub async fn close(&mut self) -> Result<()> {
        self.page.close().await
    }
}
