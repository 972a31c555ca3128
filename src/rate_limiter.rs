//! Randomized, error-scaled delay between vendor page navigations.
//!
//! Every navigation is preceded by exactly one [`RateLimiter::wait`]. The delay
//! is drawn uniformly from `[min_delay_ms, max_delay_ms]` and multiplied as the
//! share of failed requests grows.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Error ratio above which the delay is tripled.
const HEAVY_ERROR_RATIO: f64 = 0.30;
/// Error ratio above which the delay is doubled.
const LIGHT_ERROR_RATIO: f64 = 0.10;
/// Largest configurable delay bound, ten minutes.
pub const MAX_DELAY_MS: u64 = 600_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 1500,
            max_delay_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub request_count: u64,
    pub errors: u64,
    pub error_rate_percent: f64,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_request: Option<Instant>,
    request_count: u64,
    errors: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        // An inverted range would make the uniform draw panic.
        let config = RateLimitConfig {
            min_delay_ms: config.min_delay_ms.min(config.max_delay_ms),
            max_delay_ms: config.max_delay_ms.max(config.min_delay_ms),
        };

        Self {
            config,
            last_request: None,
            request_count: 0,
            errors: 0,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Suspend until the computed delay has passed since the previous `wait()` returned.
    pub async fn wait(&mut self) {
        let delay = self.calculate_delay();

        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < delay {
                let remaining = delay - elapsed;
                debug!("Rate limiting: waiting {:?}", remaining);
                tokio::time::sleep(remaining).await;
            }
        }

        self.last_request = Some(Instant::now());
        self.request_count += 1;
    }

    /// Draw the next delay: uniform base delay times the error-rate multiplier.
    pub fn calculate_delay(&self) -> Duration {
        let base_ms = if self.config.min_delay_ms == self.config.max_delay_ms {
            self.config.min_delay_ms
        } else {
            rand::rng().random_range(self.config.min_delay_ms..=self.config.max_delay_ms)
        };

        Duration::from_millis(base_ms.saturating_mul(self.multiplier()))
    }

    pub fn multiplier(&self) -> u64 {
        let ratio = self.error_ratio();
        if ratio > HEAVY_ERROR_RATIO {
            3
        } else if ratio > LIGHT_ERROR_RATIO {
            2
        } else {
            1
        }
    }

    fn error_ratio(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.errors as f64 / self.request_count as f64
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn reset(&mut self) {
        self.request_count = 0;
        self.errors = 0;
        self.last_request = None;
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            request_count: self.request_count,
            errors: self.errors,
            error_rate_percent: (self.error_ratio() * 1000.0).round() / 10.0,
        }
    }
}
