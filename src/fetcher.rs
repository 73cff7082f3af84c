//! Units of remote work and the transports that serve them.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::debug;

use crate::api::QuoteSummaryProvider;
use crate::models::{ScrapeSettings, Ticker};
use crate::scrape::pages::{scrape_earnings_calendar, scrape_key_statistics};
use crate::scrape::{Browser, EarningsEvent, ScrapedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    KeyStatistics,
    EarningsCalendar,
}

/// What a task asks the remote side for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Modules(&'static [&'static str]),
    /// Price charts, one request per bar interval
    Charts(&'static [&'static str]),
    Page(PageKind),
}

/// One ticker's fetch within a report batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub ticker: Ticker,
    pub target: FetchTarget,
}

impl FetchTask {
    pub fn new(ticker: Ticker, target: FetchTarget) -> Self {
        Self { ticker, target }
    }
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            FetchTarget::Modules(modules) => write!(f, "{} [{}]", self.ticker, modules.join(",")),
            FetchTarget::Charts(intervals) => write!(f, "{} [chart {}]", self.ticker, intervals.join(",")),
            FetchTarget::Page(PageKind::KeyStatistics) => write!(f, "{} [key statistics page]", self.ticker),
            FetchTarget::Page(PageKind::EarningsCalendar) => {
                write!(f, "{} [earnings calendar page]", self.ticker)
            }
        }
    }
}

/// Unshaped result of a successful fetch
#[derive(Debug, Clone)]
pub enum RawPayload {
    Summary(Value),
    /// Chart result per interval that had one, in request order
    Charts(Vec<(&'static str, Value)>),
    Statistics(ScrapedTable),
    Calendar(Vec<EarningsEvent>),
}

/// Transport for one report batch
#[derive(Clone)]
pub enum RemoteFetcher {
    Structured(Arc<dyn QuoteSummaryProvider>),
    Scraped {
        browser: Arc<dyn Browser>,
        settings: ScrapeSettings,
        snapshot_dir: Option<PathBuf>,
    },
}

impl RemoteFetcher {
    /// Fetch one task. `Ok(None)` means the source has no data for the ticker.
    pub async fn fetch(&self, task: &FetchTask) -> Result<Option<RawPayload>> {
        match (self, &task.target) {
            (RemoteFetcher::Structured(provider), FetchTarget::Modules(modules)) => Ok(provider
                .fetch_modules(task.ticker.as_str(), modules)
                .await?
                .map(RawPayload::Summary)),
            (RemoteFetcher::Structured(provider), FetchTarget::Charts(intervals)) => {
                let mut charts = Vec::with_capacity(intervals.len());
                for interval in intervals.iter() {
                    match provider.fetch_chart(task.ticker.as_str(), interval).await? {
                        Some(chart) => charts.push((*interval, chart)),
                        None => debug!("No {} chart for {}", interval, task.ticker),
                    }
                }
                Ok((!charts.is_empty()).then_some(RawPayload::Charts(charts)))
            }
            (
                RemoteFetcher::Scraped { browser, settings, snapshot_dir },
                FetchTarget::Page(PageKind::KeyStatistics),
            ) => Ok(scrape_key_statistics(browser.as_ref(), &task.ticker, settings, snapshot_dir.as_deref())
                .await?
                .map(RawPayload::Statistics)),
            (
                RemoteFetcher::Scraped { browser, settings, snapshot_dir },
                FetchTarget::Page(PageKind::EarningsCalendar),
            ) => Ok(scrape_earnings_calendar(browser.as_ref(), &task.ticker, settings, snapshot_dir.as_deref())
                .await?
                .map(RawPayload::Calendar)),
            _ => Err(anyhow!("{} cannot be served by this transport", task)),
        }
    }
}
