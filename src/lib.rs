pub mod api;
pub mod concurrent_fetcher;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod reports;
pub mod scrape;
pub mod tickers;
pub mod utils;
pub mod workbook;

pub use error::{SheetsError, SheetsResult};
