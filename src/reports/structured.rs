//! Shaping of quoteSummary modules.

use chrono::NaiveDate;
use serde_json::Value;

use super::{number_cell, raw_number, raw_text, text_cell};
use crate::models::{CellValue, Row, Sheet, Table, Ticker};
use crate::utils::{epoch_to_date, parse_period};

pub const PRICE_TARGET_SHEET: &str = "Analyst Price Target";
pub const GENERAL_INFO_SHEET: &str = "General information";
pub const RECOMMENDATION_TREND_SHEET: &str = "RecommendationTrend";
pub const EARNINGS_ESTIMATE_SHEET: &str = "EarningsEstimate";

/// Sheet name, module and list field of each financial statement
const STATEMENTS: [(&str, &str, &str); 6] = [
    ("Annual Income Statement", "incomeStatementHistory", "incomeStatementHistory"),
    ("Quarterly Income Statement", "incomeStatementHistoryQuarterly", "incomeStatementHistory"),
    ("Annual Balance Sheet", "balanceSheetHistory", "balanceSheetStatements"),
    ("Quarterly Balance Sheet", "balanceSheetHistoryQuarterly", "balanceSheetStatements"),
    ("Annual Cash Flow", "cashflowStatementHistory", "cashflowStatements"),
    ("Quarterly Cash Flow", "cashflowStatementHistoryQuarterly", "cashflowStatements"),
];

fn non_zero(value: Option<&Value>) -> CellValue {
    CellValue::number_or_na(value.and_then(raw_number).filter(|n| *n != 0.0))
}

fn text_or_na(value: Option<&Value>) -> CellValue {
    CellValue::text_or_na(value.and_then(raw_text).as_deref())
}

/// Category/Value rows from `financialData`; zero or blank becomes `N/A`
pub fn price_target(result: &Value) -> Option<Sheet> {
    let data = result.get("financialData")?.as_object()?;

    let rows = vec![
        ("Current Price", non_zero(data.get("currentPrice"))),
        ("Target High Price", non_zero(data.get("targetHighPrice"))),
        ("Target Low Price", non_zero(data.get("targetLowPrice"))),
        ("Target Mean Price", non_zero(data.get("targetMeanPrice"))),
        ("Analyst Opinions", non_zero(data.get("numberOfAnalystOpinions"))),
        ("Recommendation", text_or_na(data.get("recommendationKey"))),
        ("Recommendation Score", non_zero(data.get("recommendationMean"))),
    ];

    Some(Sheet::from_records(
        PRICE_TARGET_SHEET,
        &["Category", "Value"],
        rows.into_iter()
            .map(|(category, value)| vec![CellValue::text(category), value])
            .collect(),
    ))
}

/// One row of company facts from `assetProfile` and `price`
pub fn general_info(ticker: &Ticker, result: &Value) -> Option<Sheet> {
    let profile = result.get("assetProfile");
    let price = result.get("price");
    if profile.is_none() && price.is_none() {
        return None;
    }
    let field = |module: Option<&Value>, name: &str| module.and_then(|m| m.get(name)).cloned();

    let record = vec![
        CellValue::text(ticker.as_str()),
        text_or_na(field(price, "currency").as_ref()),
        text_or_na(field(profile, "sector").as_ref()),
        text_or_na(field(profile, "industry").as_ref()),
        non_zero(field(profile, "fullTimeEmployees").as_ref()),
    ];

    Some(Sheet::from_records(
        GENERAL_INFO_SHEET,
        &["Ticker", "TradingCurrency", "Sector", "Industry", "FullTimeEmployees"],
        vec![record],
    ))
}

fn trend_entries<'a>(result: &'a Value, module: &str) -> Option<&'a Vec<Value>> {
    result
        .get(module)?
        .get("trend")?
        .as_array()
        .filter(|entries| !entries.is_empty())
}

/// Analyst recommendation counts per month
pub fn recommendation_trend(result: &Value, today: NaiveDate) -> Option<Sheet> {
    let entries = trend_entries(result, "recommendationTrend")?;

    let records = entries
        .iter()
        .map(|entry| {
            let period = entry
                .get("period")
                .and_then(raw_text)
                .map(|period| CellValue::Text(parse_period(&period, today)))
                .unwrap_or_default();
            vec![
                period,
                number_cell(entry.get("strongBuy")),
                number_cell(entry.get("buy")),
                number_cell(entry.get("hold")),
                number_cell(entry.get("sell")),
                number_cell(entry.get("strongSell")),
            ]
        })
        .collect();

    Some(Sheet::from_records(
        RECOMMENDATION_TREND_SHEET,
        &["Period", "StrongBuy", "Buy", "Hold", "Sell", "StrongSell"],
        records,
    ))
}

/// Earnings and revenue estimates per period
pub fn earnings_estimate(result: &Value) -> Option<Sheet> {
    let entries = trend_entries(result, "earningsTrend")?;

    let records = entries
        .iter()
        .map(|entry| {
            let estimate = |group: &str, field: &str| number_cell(entry.get(group).and_then(|g| g.get(field)));
            vec![
                text_cell(entry.get("period")),
                number_cell(entry.get("growth")),
                estimate("earningsEstimate", "avg"),
                estimate("earningsEstimate", "low"),
                estimate("earningsEstimate", "high"),
                estimate("revenueEstimate", "avg"),
                estimate("revenueEstimate", "low"),
                estimate("revenueEstimate", "high"),
            ]
        })
        .collect();

    Some(Sheet::from_records(
        EARNINGS_ESTIMATE_SHEET,
        &[
            "Period",
            "Growth",
            "EarningsAvg",
            "EarningsLow",
            "EarningsHigh",
            "RevenueAvg",
            "RevenueLow",
            "RevenueHigh",
        ],
        records,
    ))
}

/// Metric × statement date tables, oldest statement first
pub fn financial_statements(result: &Value) -> Vec<(&'static str, Table)> {
    STATEMENTS
        .iter()
        .filter_map(|(sheet, module, list)| {
            let statements = result.get(*module)?.get(*list)?.as_array()?;
            statement_table(statements).map(|table| (*sheet, table))
        })
        .collect()
}

fn statement_table(statements: &[Value]) -> Option<Table> {
    let mut dated: Vec<(String, &serde_json::Map<String, Value>)> = statements
        .iter()
        .filter_map(|statement| {
            let fields = statement.as_object()?;
            let end_date = fields.get("endDate").and_then(raw_number)? as i64;
            Some((epoch_to_date(end_date)?, fields))
        })
        .collect();
    if dated.is_empty() {
        return None;
    }
    dated.sort_by(|a, b| a.0.cmp(&b.0));

    let mut table = Table::new("Metric");
    for (date, fields) in &dated {
        table.push_column(date.clone());
        for (metric, value) in fields.iter() {
            if metric == "endDate" || metric == "maxAge" {
                continue;
            }
            if let Some(number) = raw_number(value) {
                table.upsert_row(Row::new(metric.clone()).with(date.clone(), number));
            }
        }
    }

    (!table.is_empty()).then_some(table)
}
