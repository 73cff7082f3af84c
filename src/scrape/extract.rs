//! Pure HTML extraction. Everything here works on a document string so it can
//! be tested without a network.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Statistics table as rendered: period headers plus labelled value rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedTable {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<String>)>,
}

/// One row of the earnings calendar
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EarningsEvent {
    pub ticker: Option<String>,
    pub company: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub utc_offset: Option<i32>,
    pub estimate_eps: Option<String>,
    pub reported_eps: Option<String>,
    pub surprise: Option<String>,
}

/// Date, hour and UTC offset parsed from a French calendar cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarTimestamp {
    pub date: String,
    pub time: String,
    pub utc_offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// What clicking an element amounts to without a script engine
#[derive(Debug, Clone, PartialEq)]
pub enum ClickAction {
    Navigate(Url),
    Submit {
        method: FormMethod,
        action: Url,
        fields: Vec<(String, String)>,
    },
}

static CALENDAR_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s+(\w+)\s+(\d{4})\s+à\s+(\d{1,2})\s*h\s+UTC([+\-−]\d+)")
        .expect("calendar date pattern is valid")
});

static FRENCH_MONTHS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("janvier", "01"),
        ("février", "02"),
        ("mars", "03"),
        ("avril", "04"),
        ("mai", "05"),
        ("juin", "06"),
        ("juillet", "07"),
        ("août", "08"),
        ("septembre", "09"),
        ("octobre", "10"),
        ("novembre", "11"),
        ("décembre", "12"),
    ])
});

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {:?}", selector, e))
}

/// Visible text of an element with whitespace collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_blank(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

pub fn has_match(html: &str, selector: &str) -> Result<bool> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}

/// Extract the first table matching `table_selector`.
///
/// Headers come from `thead th` without the leading label column. Rows need at
/// least two cells; the label is the first cell's `span` when it has one, and
/// rows whose label is blank are dropped.
pub fn extract_table(html: &str, table_selector: &str) -> Result<Option<ScrapedTable>> {
    let table_selector = parse_selector(table_selector)?;
    let header_selector = parse_selector("thead th")?;
    let row_selector = parse_selector("tbody tr")?;
    let cell_selector = parse_selector("td")?;
    let span_selector = parse_selector("span")?;

    let document = Html::parse_document(html);
    let Some(table) = document.select(&table_selector).next() else {
        return Ok(None);
    };

    let columns: Vec<String> = table
        .select(&header_selector)
        .skip(1)
        .map(element_text)
        .collect();

    let mut rows = Vec::new();
    for row in table.select(&row_selector) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < 2 {
            continue;
        }
        // Footnote markers sit outside the label span
        let label = match cells[0].select(&span_selector).next() {
            Some(span) => element_text(span),
            None => element_text(cells[0]),
        };
        if label.is_empty() {
            continue;
        }
        let values: Vec<String> = cells[1..].iter().map(|cell| element_text(*cell)).collect();
        rows.push((label, values));
    }

    Ok(Some(ScrapedTable { columns, rows }))
}

/// Parse `"24 avril 2025 à 22 h UTC−4"` style cells
pub fn parse_calendar_timestamp(text: &str) -> Option<CalendarTimestamp> {
    let captures = CALENDAR_DATE.captures(text)?;
    let month = FRENCH_MONTHS.get(captures[2].to_lowercase().as_str())?;
    let utc_offset = captures[5].replace('−', "-").parse().ok()?;

    Some(CalendarTimestamp {
        date: format!("{}-{}-{:0>2}", &captures[3], month, &captures[1]),
        time: format!("{:0>2}:00:00", &captures[4]),
        utc_offset,
    })
}

/// Extract calendar rows: symbol, company, date, estimate, reported, surprise
pub fn extract_earnings_rows(html: &str, row_selector: &str) -> Result<Vec<EarningsEvent>> {
    let row_selector = parse_selector(row_selector)?;
    let cell_selector = parse_selector("td")?;
    let document = Html::parse_document(html);

    let events = document
        .select(&row_selector)
        .map(|row| {
            let cells: Vec<Option<String>> = row
                .select(&cell_selector)
                .map(|cell| non_blank(element_text(cell)))
                .collect();
            let cell = |index: usize| cells.get(index).cloned().flatten();
            let timestamp = cell(2).as_deref().and_then(parse_calendar_timestamp);

            EarningsEvent {
                ticker: cell(0),
                company: cell(1),
                date: timestamp.as_ref().map(|t| t.date.clone()),
                time: timestamp.as_ref().map(|t| t.time.clone()),
                utc_offset: timestamp.map(|t| t.utc_offset),
                estimate_eps: cell(3),
                reported_eps: cell(4),
                surprise: cell(5),
            }
        })
        .collect();

    Ok(events)
}

/// Work out what clicking the first element matching `selector` does.
///
/// Links navigate; anything inside a form submits that form together with the
/// clicked control's own name and value.
pub fn plan_click(html: &str, base: &Url, selector: &str) -> Result<Option<ClickAction>> {
    let selector = parse_selector(selector)?;
    let input_selector = parse_selector("input")?;
    let document = Html::parse_document(html);

    let Some(target) = document.select(&selector).next() else {
        return Ok(None);
    };

    if target.value().name() == "a" {
        return match target.value().attr("href") {
            Some(href) => Ok(Some(ClickAction::Navigate(base.join(href)?))),
            None => Ok(None),
        };
    }

    let Some(form) = target
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "form")
    else {
        return Ok(None);
    };

    let method = match form.value().attr("method") {
        Some(method) if method.eq_ignore_ascii_case("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };
    let action = match form.value().attr("action") {
        Some(action) if !action.trim().is_empty() => base.join(action.trim())?,
        _ => base.clone(),
    };

    let mut fields = Vec::new();
    for input in form.select(&input_selector) {
        let element = input.value();
        let Some(name) = element.attr("name") else {
            continue;
        };
        let kind = element.attr("type").unwrap_or("text").to_ascii_lowercase();
        let include = match kind.as_str() {
            "submit" | "button" | "image" | "reset" | "file" => false,
            "checkbox" | "radio" => element.attr("checked").is_some(),
            _ => true,
        };
        if include {
            fields.push((name.to_string(), element.attr("value").unwrap_or_default().to_string()));
        }
    }
    if let Some(name) = target.value().attr("name") {
        let value = target.value().attr("value").unwrap_or_default();
        fields.push((name.to_string(), value.to_string()));
    }

    Ok(Some(ClickAction::Submit { method, action, fields }))
}
