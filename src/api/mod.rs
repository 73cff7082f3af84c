use std::num::NonZeroU32;

use anyhow::Result;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;

pub mod yahoo_client;
pub use yahoo_client::YahooClient;

/// Evenly spaced request quota for API calls
pub struct ApiRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// Structured data source: quoteSummary modules and price charts
#[async_trait::async_trait]
pub trait QuoteSummaryProvider: Send + Sync {
    /// Fetch the named modules for one ticker.
    ///
    /// Returns the result object (module name → payload), or `None` when the
    /// source has nothing for the ticker.
    async fn fetch_modules(&self, ticker: &str, modules: &[&str]) -> Result<Option<Value>>;

    /// Fetch the full price chart at one bar interval (`1d`, `1wk`, `1mo`),
    /// dividend events included. `None` when the ticker has no chart.
    async fn fetch_chart(&self, ticker: &str, interval: &str) -> Result<Option<Value>>;
}
