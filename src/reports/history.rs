//! Shaping of v8 chart results into price history sheets.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::models::{CellValue, Sheet};

/// Bar interval requested from the chart endpoint and the sheet it fills
pub const CHART_INTERVALS: [(&str, &str); 3] = [("1d", "Daily"), ("1wk", "Weekly"), ("1mo", "Monthly")];

pub const DIVIDENDS_SHEET: &str = "Dividends";

const PRICE_COLUMNS: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"];

/// Interval codes of [`CHART_INTERVALS`], in request order
pub const INTERVAL_CODES: &[&str] = &["1d", "1wk", "1mo"];

fn sheet_for_interval(interval: &str) -> Option<&'static str> {
    CHART_INTERVALS
        .iter()
        .find(|(code, _)| *code == interval)
        .map(|(_, sheet)| *sheet)
}

/// Exchange-local calendar date of a bar timestamp
fn local_date(timestamp: i64, gmt_offset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp + gmt_offset, 0).map(|datetime| datetime.date_naive())
}

fn gmt_offset(chart: &Value) -> i64 {
    chart
        .get("meta")
        .and_then(|meta| meta.get("gmtoffset"))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn series<'a>(block: Option<&'a Value>, field: &str) -> &'a [Value] {
    block
        .and_then(|block| block.get(field))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn number_at(values: &[Value], index: usize) -> Option<f64> {
    values.get(index).and_then(Value::as_f64)
}

/// One row per bar, oldest first. Bars without any price are dropped.
fn price_sheet(name: &str, chart: &Value) -> Option<Sheet> {
    let timestamps = chart.get("timestamp")?.as_array()?;
    let offset = gmt_offset(chart);
    let indicators = chart.get("indicators");
    let quote = indicators.and_then(|i| i.get("quote")).and_then(|q| q.get(0));
    let adjusted = indicators.and_then(|i| i.get("adjclose")).and_then(|a| a.get(0));

    let open = series(quote, "open");
    let high = series(quote, "high");
    let low = series(quote, "low");
    let close = series(quote, "close");
    let volume = series(quote, "volume");
    let adj_close = series(adjusted, "adjclose");

    let mut records = Vec::with_capacity(timestamps.len());
    for (index, timestamp) in timestamps.iter().enumerate() {
        let Some(date) = timestamp.as_i64().and_then(|ts| local_date(ts, offset)) else {
            continue;
        };
        let prices = [open, high, low, close].map(|values| number_at(values, index));
        if prices.iter().all(Option::is_none) {
            continue;
        }

        let mut record = vec![CellValue::date(date)];
        record.extend(prices.into_iter().map(|price| price.map(CellValue::Number).unwrap_or_default()));
        record.push(number_at(adj_close, index).map(CellValue::Number).unwrap_or_default());
        record.push(number_at(volume, index).map(CellValue::Number).unwrap_or_default());
        records.push(record);
    }

    (!records.is_empty()).then(|| Sheet::from_records(name, &PRICE_COLUMNS, records))
}

/// Dividend events of every chart, one row per ex-date
fn dividends_sheet(charts: &[(&str, Value)]) -> Sheet {
    let mut paid: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (_, chart) in charts {
        let offset = gmt_offset(chart);
        let Some(events) = chart
            .get("events")
            .and_then(|events| events.get("dividends"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        for event in events.values() {
            let date = event.get("date").and_then(Value::as_i64).and_then(|ts| local_date(ts, offset));
            let amount = event.get("amount").and_then(Value::as_f64);
            if let (Some(date), Some(amount)) = (date, amount) {
                paid.insert(date, amount);
            }
        }
    }

    Sheet::from_records(
        DIVIDENDS_SHEET,
        &["Date", "Dividend"],
        paid.into_iter()
            .map(|(date, amount)| vec![CellValue::date(date), CellValue::Number(amount)])
            .collect(),
    )
}

/// Price sheets per interval plus the dividends sheet.
///
/// `None` when no interval returned a single bar.
pub fn history_sheets(charts: &[(&str, Value)]) -> Option<Vec<Sheet>> {
    let mut sheets: Vec<Sheet> = charts
        .iter()
        .filter_map(|(interval, chart)| price_sheet(sheet_for_interval(interval)?, chart))
        .collect();
    if sheets.is_empty() {
        return None;
    }

    sheets.push(dividends_sheet(charts));
    Some(sheets)
}
