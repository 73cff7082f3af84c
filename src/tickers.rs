//! Ticker list loading from the input sheet.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use crate::error::{SheetsError, SheetsResult};
use crate::models::Ticker;

pub struct TickerSource;

impl TickerSource {
    /// Read the ticker column of the first sheet of `path`.
    ///
    /// Spreadsheets (`xlsx`, `xlsm`, `xls`, `ods`) and `csv` files are
    /// accepted. Blank and non-text entries are dropped, values are trimmed,
    /// source order is kept and duplicates are not removed.
    pub fn load(path: &Path, column: &str) -> SheetsResult<Vec<Ticker>> {
        if !path.exists() {
            return Err(SheetsError::input_read(path, "file does not exist"));
        }

        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let tickers = if is_csv {
            Self::load_csv(path, column)?
        } else {
            Self::load_workbook(path, column)?
        };

        info!("📋 Loaded {} ticker(s) from {}", tickers.len(), path.display());
        Ok(tickers)
    }

    fn load_workbook(path: &Path, column: &str) -> SheetsResult<Vec<Ticker>> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| SheetsError::input_read(path, e))?;
        let first_sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SheetsError::input_read(path, "workbook has no sheets"))?;
        debug!("Reading tickers from sheet '{}'", first_sheet);

        let range = workbook
            .worksheet_range(&first_sheet)
            .map_err(|e| SheetsError::input_read(path, e))?;

        let mut rows = range.rows();
        let header = rows
            .next()
            .ok_or_else(|| SheetsError::input_read(path, "sheet is empty"))?;
        let index = header
            .iter()
            .position(|cell| matches!(cell, Data::String(name) if name.trim() == column))
            .ok_or_else(|| missing_column(path, column))?;

        Ok(rows
            .filter_map(|row| match row.get(index) {
                Some(Data::String(value)) => ticker_from(value),
                _ => None,
            })
            .collect())
    }

    fn load_csv(path: &Path, column: &str) -> SheetsResult<Vec<Ticker>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| SheetsError::input_read(path, e))?;

        let index = reader
            .headers()
            .map_err(|e| SheetsError::input_read(path, e))?
            .iter()
            .position(|name| name.trim() == column)
            .ok_or_else(|| missing_column(path, column))?;

        let mut tickers = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SheetsError::input_read(path, e))?;
            if let Some(ticker) = record.get(index).and_then(ticker_from) {
                tickers.push(ticker);
            }
        }
        Ok(tickers)
    }
}

fn ticker_from(value: &str) -> Option<Ticker> {
    let symbol = value.trim();
    (!symbol.is_empty()).then(|| Ticker::new(symbol))
}

fn missing_column(path: &Path, column: &str) -> SheetsError {
    SheetsError::input_read(path, format!("no '{}' column in header row", column))
}
