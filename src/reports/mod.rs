//! Report catalogue: what each report fetches, where it is written and how a
//! raw payload is shaped into sheets.

use std::fmt;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{SheetsError, SheetsResult};
use crate::fetcher::{FetchTarget, PageKind, RawPayload};
use crate::models::{CellValue, Sheet, Table, Ticker};

pub mod history;
pub mod scraped;
pub mod structured;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ReportKind {
    PriceTarget,
    GeneralInfo,
    RecommendationTrend,
    EarningsEstimate,
    Financials,
    HistoricalPrices,
    KeyStatistics,
    EarningsCalendar,
}

/// Where a report's sheets end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Upserted into the ticker's `<T>_valuation_measures.xlsx`
    Valuation,
    /// Written as a fresh `<prefix>_<T>.xlsx`
    Standalone(&'static str),
}

/// Content destined for one sheet
#[derive(Debug, Clone, PartialEq)]
pub enum SheetContent {
    /// Written as is
    Cells(Vec<Vec<CellValue>>),
    /// Merged with the stored sheet of the same name before writing
    Merged(Table),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetUpdate {
    pub name: String,
    pub content: SheetContent,
}

impl SheetUpdate {
    pub fn cells(sheet: Sheet) -> Self {
        Self {
            name: sheet.name,
            content: SheetContent::Cells(sheet.cells),
        }
    }

    pub fn merged(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            content: SheetContent::Merged(table),
        }
    }
}

const FINANCIAL_MODULES: &[&str] = &[
    "incomeStatementHistory",
    "incomeStatementHistoryQuarterly",
    "balanceSheetHistory",
    "balanceSheetHistoryQuarterly",
    "cashflowStatementHistory",
    "cashflowStatementHistoryQuarterly",
];

impl ReportKind {
    /// Every report, in run order
    pub fn all() -> Vec<ReportKind> {
        vec![
            ReportKind::PriceTarget,
            ReportKind::GeneralInfo,
            ReportKind::RecommendationTrend,
            ReportKind::EarningsEstimate,
            ReportKind::Financials,
            ReportKind::HistoricalPrices,
            ReportKind::KeyStatistics,
            ReportKind::EarningsCalendar,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::PriceTarget => "price-target",
            ReportKind::GeneralInfo => "general-info",
            ReportKind::RecommendationTrend => "recommendation-trend",
            ReportKind::EarningsEstimate => "earnings-estimate",
            ReportKind::Financials => "financials",
            ReportKind::HistoricalPrices => "historical-prices",
            ReportKind::KeyStatistics => "key-statistics",
            ReportKind::EarningsCalendar => "earnings-calendar",
        }
    }

    pub fn target(&self) -> FetchTarget {
        match self {
            ReportKind::PriceTarget => FetchTarget::Modules(&["financialData"]),
            ReportKind::GeneralInfo => FetchTarget::Modules(&["assetProfile", "price"]),
            ReportKind::RecommendationTrend => FetchTarget::Modules(&["recommendationTrend"]),
            ReportKind::EarningsEstimate => FetchTarget::Modules(&["earningsTrend"]),
            ReportKind::Financials => FetchTarget::Modules(FINANCIAL_MODULES),
            ReportKind::HistoricalPrices => FetchTarget::Charts(history::INTERVAL_CODES),
            ReportKind::KeyStatistics => FetchTarget::Page(PageKind::KeyStatistics),
            ReportKind::EarningsCalendar => FetchTarget::Page(PageKind::EarningsCalendar),
        }
    }

    pub fn is_scraped(&self) -> bool {
        matches!(self.target(), FetchTarget::Page(_))
    }

    pub fn destination(&self) -> Destination {
        match self {
            ReportKind::RecommendationTrend => Destination::Standalone("recommendation_trend"),
            ReportKind::EarningsEstimate => Destination::Standalone("earnings_estimate"),
            _ => Destination::Valuation,
        }
    }

    /// Shape a fetched payload into sheet updates.
    ///
    /// Fails with `MissingData` when the payload holds nothing to write.
    pub fn shape(&self, ticker: &Ticker, payload: RawPayload, today: NaiveDate) -> SheetsResult<Vec<SheetUpdate>> {
        let missing = || SheetsError::missing(ticker.as_str(), self.name());

        let updates = match (self, payload) {
            (ReportKind::PriceTarget, RawPayload::Summary(result)) => {
                structured::price_target(&result).map(|sheet| vec![SheetUpdate::cells(sheet)])
            }
            (ReportKind::GeneralInfo, RawPayload::Summary(result)) => {
                structured::general_info(ticker, &result).map(|sheet| vec![SheetUpdate::cells(sheet)])
            }
            (ReportKind::RecommendationTrend, RawPayload::Summary(result)) => {
                structured::recommendation_trend(&result, today).map(|sheet| vec![SheetUpdate::cells(sheet)])
            }
            (ReportKind::EarningsEstimate, RawPayload::Summary(result)) => {
                structured::earnings_estimate(&result).map(|sheet| vec![SheetUpdate::cells(sheet)])
            }
            (ReportKind::Financials, RawPayload::Summary(result)) => {
                let updates: Vec<SheetUpdate> = structured::financial_statements(&result)
                    .into_iter()
                    .map(|(name, table)| SheetUpdate::merged(name, table))
                    .collect();
                (!updates.is_empty()).then_some(updates)
            }
            (ReportKind::HistoricalPrices, RawPayload::Charts(charts)) => {
                history::history_sheets(&charts).map(|sheets| sheets.into_iter().map(SheetUpdate::cells).collect())
            }
            (ReportKind::KeyStatistics, RawPayload::Statistics(table)) => {
                scraped::valuation_table(&table).map(|table| vec![SheetUpdate::merged(scraped::VALUATION_SHEET, table)])
            }
            (ReportKind::EarningsCalendar, RawPayload::Calendar(events)) => {
                scraped::earnings_sheet(&events, today).map(|sheet| vec![SheetUpdate::cells(sheet)])
            }
            _ => None,
        };

        updates.ok_or_else(missing)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric value of a field sent either plain or as `{raw, fmt}`
pub fn raw_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Object(object) => object.get("raw").and_then(Value::as_f64),
        _ => None,
    }
}

/// Text value of a field sent either plain or as `{raw, fmt}`
pub fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(object) => object.get("raw").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Number cell, or empty when the field is absent
pub(crate) fn number_cell(value: Option<&Value>) -> CellValue {
    value.and_then(raw_number).map(CellValue::Number).unwrap_or_default()
}

/// Text cell, or empty when the field is absent
pub(crate) fn text_cell(value: Option<&Value>) -> CellValue {
    value.and_then(raw_text).map(CellValue::Text).unwrap_or_default()
}
