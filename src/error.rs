use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for a workbook refresh run.
///
/// Only `InputRead` and `Config` abort a run. Everything else is scoped to a
/// single ticker and is logged before the batch moves on.
#[derive(Debug, Error)]
pub enum SheetsError {
    /// The ticker list could not be read.
    #[error("failed to read ticker input {path}: {reason}")]
    InputRead { path: PathBuf, reason: String },

    /// A fetch exhausted its retry budget.
    #[error("fetch for {ticker} failed after {attempts} attempt(s): {message}")]
    Fetch {
        ticker: String,
        attempts: u32,
        message: String,
    },

    /// The remote source has nothing for this ticker. Not a failure.
    #[error("no {what} data for {ticker}")]
    MissingData { ticker: String, what: String },

    /// The workbook could not be loaded or written.
    #[error("failed to write workbook {path}: {reason}")]
    StoreWrite { path: PathBuf, reason: String },

    /// Invalid configuration detected at start-up.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SheetsError {
    pub fn input_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InputRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn store_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StoreWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(ticker: impl Into<String>, what: impl Into<String>) -> Self {
        Self::MissingData {
            ticker: ticker.into(),
            what: what.into(),
        }
    }

    /// Whether this error should abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InputRead { .. } | Self::Config(_))
    }
}

pub type SheetsResult<T> = std::result::Result<T, SheetsError>;
