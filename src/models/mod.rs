use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SheetsError;

pub mod table;
pub use table::{CellValue, Row, Sheet, Table, NOT_AVAILABLE};

/// Ticker identifier as read from the input sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ticker {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How cells a merged row has no value for are written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MissingCellPolicy {
    /// Leave the cell blank
    #[default]
    Unset,
    /// Write the `N/A` sentinel
    Sentinel,
}

impl FromStr for MissingCellPolicy {
    type Err = SheetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unset" | "blank" | "empty" => Ok(Self::Unset),
            "sentinel" | "n/a" | "na" => Ok(Self::Sentinel),
            other => Err(SheetsError::Config(format!(
                "unknown missing cell policy '{}', expected 'unset' or 'sentinel'",
                other
            ))),
        }
    }
}

/// Endpoints used by the quote summary client
#[derive(Debug, Clone)]
pub struct YahooEndpoints {
    /// Visited once to obtain the session cookie
    pub cookie_url: String,
    pub crumb_url: String,
    pub api_base: String,
}

impl Default for YahooEndpoints {
    fn default() -> Self {
        Self {
            cookie_url: "https://fc.yahoo.com".to_string(),
            crumb_url: "https://query1.finance.yahoo.com/v1/test/getcrumb".to_string(),
            api_base: "https://query2.finance.yahoo.com".to_string(),
        }
    }
}

/// Page locations and wait budgets for scraped reports
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub quote_base_url: String,
    pub calendar_base_url: String,
    pub accept_language: String,
    pub navigation_timeout: Duration,
    /// Budget for a consent or overlay dialog to show up
    pub overlay_wait: Duration,
    pub table_wait: Duration,
    pub calendar_row_wait: Duration,
    pub poll_interval: Duration,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            quote_base_url: "https://finance.yahoo.com".to_string(),
            calendar_base_url: "https://fr.finance.yahoo.com".to_string(),
            accept_language: "fr-FR,fr;q=0.9,en;q=0.8".to_string(),
            navigation_timeout: Duration::from_secs(60),
            overlay_wait: Duration::from_secs(3),
            table_wait: Duration::from_secs(30),
            calendar_row_wait: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub tickers_path: PathBuf,
    pub ticker_column: String,
    pub output_dir: PathBuf,
    pub concurrency_limit: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub rate_limit_per_minute: u32,
    pub request_timeout: Duration,
    pub missing_cells: MissingCellPolicy,
    pub recreate_corrupt_workbooks: bool,
    pub snapshot_on_error: bool,
    pub yahoo: YahooEndpoints,
    pub scrape: ScrapeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tickers_path: PathBuf::from("tickers.xlsx"),
            ticker_column: "Ticker".to_string(),
            output_dir: PathBuf::from("xlsx"),
            concurrency_limit: 5,
            max_retries: 3,
            retry_delay: Duration::from_millis(3000),
            rate_limit_per_minute: 120,
            request_timeout: Duration::from_secs(30),
            missing_cells: MissingCellPolicy::Unset,
            recreate_corrupt_workbooks: false,
            snapshot_on_error: false,
            yahoo: YahooEndpoints::default(),
            scrape: ScrapeSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, SheetsError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SheetsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let number = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str| -> bool {
            lookup(key)
                .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let missing_cells = match lookup("MISSING_CELL_POLICY") {
            Some(value) => value.parse()?,
            None => defaults.missing_cells,
        };

        let scrape_defaults = defaults.scrape;
        let scrape = ScrapeSettings {
            quote_base_url: lookup("YAHOO_QUOTE_PAGE_BASE").unwrap_or(scrape_defaults.quote_base_url),
            calendar_base_url: lookup("YAHOO_CALENDAR_PAGE_BASE")
                .unwrap_or(scrape_defaults.calendar_base_url),
            accept_language: lookup("SCRAPE_ACCEPT_LANGUAGE").unwrap_or(scrape_defaults.accept_language),
            navigation_timeout: Duration::from_secs(number(
                "SCRAPE_NAVIGATION_TIMEOUT_SECS",
                scrape_defaults.navigation_timeout.as_secs(),
            )),
            table_wait: Duration::from_secs(number(
                "SCRAPE_TABLE_WAIT_SECS",
                scrape_defaults.table_wait.as_secs(),
            )),
            ..scrape_defaults
        };

        let yahoo_defaults = defaults.yahoo;
        let yahoo = YahooEndpoints {
            cookie_url: lookup("YAHOO_COOKIE_URL").unwrap_or(yahoo_defaults.cookie_url),
            crumb_url: lookup("YAHOO_CRUMB_URL").unwrap_or(yahoo_defaults.crumb_url),
            api_base: lookup("YAHOO_API_BASE").unwrap_or(yahoo_defaults.api_base),
        };

        let config = Config {
            tickers_path: lookup("TICKERS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tickers_path),
            ticker_column: lookup("TICKER_COLUMN").unwrap_or(defaults.ticker_column),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            concurrency_limit: number("CONCURRENCY_LIMIT", defaults.concurrency_limit as u64) as usize,
            max_retries: number("MAX_RETRIES", defaults.max_retries as u64) as u32,
            retry_delay: Duration::from_millis(number(
                "RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )),
            rate_limit_per_minute: number(
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute as u64,
            ) as u32,
            request_timeout: Duration::from_secs(number(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            missing_cells,
            recreate_corrupt_workbooks: flag("RECREATE_CORRUPT_WORKBOOKS"),
            snapshot_on_error: flag("SNAPSHOT_ON_ERROR"),
            yahoo,
            scrape,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SheetsError> {
        if self.concurrency_limit == 0 {
            return Err(SheetsError::Config("concurrency limit must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(SheetsError::Config("retry count must be at least 1".into()));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(SheetsError::Config("rate limit must be at least 1 request per minute".into()));
        }
        if self.ticker_column.trim().is_empty() {
            return Err(SheetsError::Config("ticker column name is empty".into()));
        }
        Ok(())
    }
}
