//! Page flows for the statistics table and the earnings calendar.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use super::extract::{extract_earnings_rows, extract_table, EarningsEvent, ScrapedTable};
use super::{dismiss_overlay, with_page, Browser, Page};
use crate::models::{ScrapeSettings, Ticker};

pub const CONSENT_SELECTOR: &str = r#"button.accept-all, button[name="agree"], button[value="agree"]"#;
pub const CALENDAR_CONSENT_SELECTOR: &str = r#"button[name="agree"]"#;
pub const SCROLL_BUTTON_SELECTOR: &str = "#scroll-down-btn";
pub const STATISTICS_TABLE_SELECTOR: &str = r#"table.table.yf-kbx2lo, div[data-test="key-stats-table"] table"#;
pub const CALENDAR_ROW_SELECTOR: &str = "tr.row";

/// The calendar is paged by 100 rows; two pages cover a ticker's history
pub const CALENDAR_OFFSETS: [u32; 2] = [0, 100];
const CALENDAR_PAGE_SIZE: u32 = 100;

pub fn statistics_url(base: &str, ticker: &Ticker) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid quote page base '{}'", base))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("quote page base cannot carry a path"))?
        .pop_if_empty()
        .extend(["quote", ticker.as_str(), "key-statistics"]);
    url.query_pairs_mut().append_pair("p", ticker.as_str());
    Ok(url)
}

pub fn calendar_url(base: &str, ticker: &Ticker, offset: u32) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid calendar base '{}'", base))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("calendar base cannot carry a path"))?
        .pop_if_empty()
        .extend(["calendar", "earnings"]);
    url.query_pairs_mut()
        .append_pair("symbol", ticker.as_str())
        .append_pair("size", &CALENDAR_PAGE_SIZE.to_string())
        .append_pair("offset", &offset.to_string());
    Ok(url)
}

/// Where a failed page's document is saved
pub fn snapshot_path(dir: &Path, ticker: &Ticker) -> PathBuf {
    dir.join(format!("{}_error_page.html", ticker))
}

async fn save_snapshot(page: &mut dyn Page, path: &Path) {
    let Some(html) = page.content() else {
        return;
    };
    match tokio::fs::write(path, html).await {
        Ok(()) => info!("📸 Saved failing page to {}", path.display()),
        Err(e) => warn!("Could not save page snapshot {}: {}", path.display(), e),
    }
}

/// Scrape the key statistics table for a ticker.
///
/// `Ok(None)` when the table never shows up within the wait budget.
pub async fn scrape_key_statistics(
    browser: &dyn Browser,
    ticker: &Ticker,
    settings: &ScrapeSettings,
    snapshot_dir: Option<&Path>,
) -> Result<Option<ScrapedTable>> {
    let url = statistics_url(&settings.quote_base_url, ticker)?;
    let settings = settings.clone();
    let snapshot = snapshot_dir.map(|dir| snapshot_path(dir, ticker));

    with_page(browser, move |page| {
        Box::pin(async move {
            let result: Result<Option<ScrapedTable>> = async {
                page.goto(url.as_str(), settings.navigation_timeout).await?;
                dismiss_overlay(page, CONSENT_SELECTOR, settings.overlay_wait).await;
                dismiss_overlay(page, SCROLL_BUTTON_SELECTOR, settings.overlay_wait).await;

                if !page
                    .wait_for_selector(STATISTICS_TABLE_SELECTOR, settings.table_wait)
                    .await?
                {
                    return Ok(None);
                }
                let html = page.content().unwrap_or_default();
                extract_table(&html, STATISTICS_TABLE_SELECTOR)
            }
            .await;

            if result.is_err() {
                if let Some(path) = snapshot {
                    save_snapshot(page, &path).await;
                }
            }
            result
        })
    })
    .await
}

/// Scrape both calendar pages for a ticker.
///
/// A page without rows is skipped; `Ok(None)` when neither page had any.
pub async fn scrape_earnings_calendar(
    browser: &dyn Browser,
    ticker: &Ticker,
    settings: &ScrapeSettings,
    snapshot_dir: Option<&Path>,
) -> Result<Option<Vec<EarningsEvent>>> {
    let urls = CALENDAR_OFFSETS
        .iter()
        .map(|offset| calendar_url(&settings.calendar_base_url, ticker, *offset))
        .collect::<Result<Vec<_>>>()?;
    let settings = settings.clone();
    let ticker = ticker.clone();
    let snapshot = snapshot_dir.map(|dir| snapshot_path(dir, &ticker));

    with_page(browser, move |page| {
        Box::pin(async move {
            let result: Result<Vec<EarningsEvent>> = async {
                let mut events = Vec::new();
                for url in &urls {
                    page.goto(url.as_str(), settings.navigation_timeout).await?;
                    dismiss_overlay(page, CALENDAR_CONSENT_SELECTOR, settings.overlay_wait).await;
                    dismiss_overlay(page, SCROLL_BUTTON_SELECTOR, settings.overlay_wait).await;

                    if !page
                        .wait_for_selector(CALENDAR_ROW_SELECTOR, settings.calendar_row_wait)
                        .await?
                    {
                        info!("⛔ No calendar rows for {} at {}", ticker, url);
                        continue;
                    }
                    let html = page.content().unwrap_or_default();
                    events.extend(extract_earnings_rows(&html, CALENDAR_ROW_SELECTOR)?);
                }
                Ok(events)
            }
            .await;

            match result {
                Ok(events) => Ok((!events.is_empty()).then_some(events)),
                Err(e) => {
                    if let Some(path) = snapshot {
                        save_snapshot(page, &path).await;
                    }
                    Err(e)
                }
            }
        })
    })
    .await
}
