//! Shaping of scraped pages.

use chrono::NaiveDate;

use crate::models::{CellValue, Row, Sheet, Table};
use crate::scrape::{EarningsEvent, ScrapedTable};

pub const VALUATION_SHEET: &str = "Valuation";
pub const VALUATION_KEY: &str = "Metric";

const EARNINGS_COLUMNS: [&str; 8] = [
    "ticker",
    "company",
    "date",
    "time",
    "UTC",
    "estimateEPS",
    "reportedEPS",
    "surprise",
];

/// Key statistics as a Metric-keyed table. Values pair with headers by
/// position; blank values stay unset.
pub fn valuation_table(scraped: &ScrapedTable) -> Option<Table> {
    let mut table = Table::with_columns(VALUATION_KEY, scraped.columns.iter().cloned());

    for (label, values) in &scraped.rows {
        if label.trim().is_empty() {
            continue;
        }
        let mut row = Row::new(label.trim());
        for (column, value) in scraped.columns.iter().zip(values) {
            if !value.trim().is_empty() {
                row.set(column.clone(), value.as_str());
            }
        }
        table.upsert_row(row);
    }

    (!table.is_empty()).then_some(table)
}

/// Sheet named after the run date
pub fn earnings_sheet_name(today: NaiveDate) -> String {
    format!("earnings_{}", today.format("%Y-%m-%d"))
}

pub fn earnings_sheet(events: &[EarningsEvent], today: NaiveDate) -> Option<Sheet> {
    if events.is_empty() {
        return None;
    }
    let text = |value: &Option<String>| value.clone().map(CellValue::Text).unwrap_or_default();

    let records = events
        .iter()
        .map(|event| {
            vec![
                text(&event.ticker),
                text(&event.company),
                text(&event.date),
                text(&event.time),
                event
                    .utc_offset
                    .map(|offset| CellValue::from(offset as i64))
                    .unwrap_or_default(),
                text(&event.estimate_eps),
                text(&event.reported_eps),
                text(&event.surprise),
            ]
        })
        .collect();

    Some(Sheet::from_records(earnings_sheet_name(today), &EARNINGS_COLUMNS, records))
}
