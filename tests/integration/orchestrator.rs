//! Whole report runs over mock remotes and a temp output directory

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::common::fixtures::{
    financial_data, income_statements, test_config, write_tickers, EMPTY_PAGE_HTML, KEY_STATISTICS_HTML,
};
use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use crate::common::mocks::{MockLauncher, MockProvider};
use stock_workbooks::models::{CellValue, Config, Sheet, Ticker};
use stock_workbooks::orchestrator::Orchestrator;
use stock_workbooks::reports::scraped::VALUATION_SHEET;
use stock_workbooks::reports::structured::PRICE_TARGET_SHEET;
use stock_workbooks::reports::ReportKind;
use stock_workbooks::scrape::{Browser, BrowserLauncher};
use stock_workbooks::SheetsError;

const CALENDAR_HTML: &str = r#"<html><body><table><tbody>
<tr class="row"><td>AAPL</td><td>Apple Inc.</td><td>1 mai 2025 à 4 h UTC−4</td><td>1,62</td><td>1,65</td><td>+1,85</td></tr>
</tbody></table></body></html>"#;

fn orchestrator(config: Config, provider: MockProvider) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(provider),
        Arc::new(MockLauncher::new(HashMap::new())),
    )
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
}

struct BrokenLauncher;

#[async_trait]
impl BrowserLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Arc<dyn Browser>> {
        Err(anyhow!("no browser binary"))
    }
}

#[tokio::test]
async fn test_ticker_without_data_is_skipped_and_batch_continues() {
    init_test_logging();
    log_test_step("Running price-target over AAPL, ZZZZ, MSFT");
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL", "ZZZZ", "MSFT"]);
    let provider = MockProvider::new()
        .with_result("AAPL", financial_data(200.0, "buy"))
        .with_result("MSFT", financial_data(400.0, "hold"));
    let orchestrator = orchestrator(test_config(&dir, tickers), provider);

    let summary = orchestrator.run(&[ReportKind::PriceTarget]).await.unwrap();
    log_test_data("summary", &summary);

    assert_eq!(summary.tickers, 3);
    let report = &summary.reports[0];
    assert_eq!(report.written, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.failed.is_empty());
    assert!(!summary.has_failures());

    let store = orchestrator.store();
    assert!(store.valuation_path(&Ticker::from("AAPL")).exists());
    assert!(store.valuation_path(&Ticker::from("MSFT")).exists());
    assert!(!store.valuation_path(&Ticker::from("ZZZZ")).exists());

    let cells = store
        .read_sheet(&store.valuation_path(&Ticker::from("MSFT")), PRICE_TARGET_SHEET)
        .unwrap()
        .unwrap();
    assert_eq!(cells[0], vec![CellValue::text("Category"), CellValue::text("Value")]);
    assert_eq!(cells[1], vec![CellValue::text("Current Price"), CellValue::Number(400.0)]);
}

#[tokio::test]
async fn test_failing_ticker_exhausts_retries() {
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL", "FAIL"]);
    let provider = Arc::new(
        MockProvider::new()
            .with_result("AAPL", financial_data(200.0, "buy"))
            .failing("FAIL"),
    );
    let config = test_config(&dir, tickers);
    let max_retries = config.max_retries as usize;
    let orchestrator = Orchestrator::new(
        config,
        provider.clone(),
        Arc::new(MockLauncher::new(HashMap::new())),
    );

    let summary = orchestrator.run(&[ReportKind::PriceTarget]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.written, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, Ticker::from("FAIL"));
    assert!(report.failed[0].1.contains("503"));
    assert_eq!(provider.calls_for("FAIL"), max_retries);
    assert_eq!(provider.calls_for("AAPL"), 1);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn test_rerun_keeps_single_sheet() {
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL"]);
    let provider = MockProvider::new().with_result("AAPL", financial_data(200.0, "buy"));
    let orchestrator = orchestrator(test_config(&dir, tickers), provider);

    orchestrator.run(&[ReportKind::PriceTarget]).await.unwrap();
    orchestrator.run(&[ReportKind::PriceTarget]).await.unwrap();

    let store = orchestrator.store();
    let workbook = store.load(&store.valuation_path(&Ticker::from("AAPL"))).unwrap();
    assert_eq!(workbook.sheet_names(), vec![PRICE_TARGET_SHEET]);
}

#[tokio::test]
async fn test_financials_accumulate_periods_across_runs() {
    log_test_step("Two financials runs with different statement dates");
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL"]);
    let provider = Arc::new(MockProvider::new().with_result("AAPL", income_statements(&[(1_672_531_200, 100.0)])));
    let orchestrator = Orchestrator::new(
        test_config(&dir, tickers),
        provider.clone(),
        Arc::new(MockLauncher::new(HashMap::new())),
    );

    orchestrator.run(&[ReportKind::Financials]).await.unwrap();
    provider.set_result("AAPL", income_statements(&[(1_704_067_200, 200.0)]));
    orchestrator.run(&[ReportKind::Financials]).await.unwrap();

    let store = orchestrator.store();
    let cells = store
        .read_sheet(&store.valuation_path(&Ticker::from("AAPL")), "Annual Income Statement")
        .unwrap()
        .unwrap();
    assert_eq!(
        cells,
        vec![
            vec![CellValue::text("Metric"), CellValue::text("2023-01-01"), CellValue::text("2024-01-01")],
            vec![CellValue::text("totalRevenue"), CellValue::Number(100.0), CellValue::Number(200.0)],
        ]
    );
}

#[tokio::test]
async fn test_standalone_report_replaces_workbook() {
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL"]);
    let config = test_config(&dir, tickers);
    let provider = MockProvider::new().with_result(
        "AAPL",
        serde_json::json!({
            "recommendationTrend": {"trend": [
                {"period": "0m", "strongBuy": 10, "buy": 20, "hold": 5, "sell": 1, "strongSell": 0}
            ]}
        }),
    );
    let orchestrator = orchestrator(config, provider);
    let store = orchestrator.store();
    let path = store.report_path("recommendation_trend", &Ticker::from("AAPL"));
    store.ensure_output_dir().unwrap();
    store
        .replace_workbook(&path, vec![Sheet::new("Stale", vec![vec![CellValue::text("old")]])])
        .unwrap();

    let summary = orchestrator.run(&[ReportKind::RecommendationTrend]).await.unwrap();

    assert_eq!(summary.reports[0].written, 1);
    let workbook = store.load(&path).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["RecommendationTrend"]);
}

#[tokio::test]
async fn test_key_statistics_merge_into_valuation_sheet() {
    init_test_logging();
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL", "MSFT"]);
    let config = test_config(&dir, tickers);
    let documents = HashMap::from([
        (
            "http://quotes.test/quote/AAPL/key-statistics?p=AAPL".to_string(),
            KEY_STATISTICS_HTML.to_string(),
        ),
        (
            "http://quotes.test/quote/MSFT/key-statistics?p=MSFT".to_string(),
            EMPTY_PAGE_HTML.to_string(),
        ),
    ]);
    let launcher = Arc::new(MockLauncher::new(documents));
    let orchestrator = Orchestrator::new(config, Arc::new(MockProvider::new()), launcher.clone());

    let store = orchestrator.store();
    let path = store.valuation_path(&Ticker::from("AAPL"));
    store.ensure_output_dir().unwrap();
    store
        .upsert_sheets(
            &path,
            vec![Sheet::new(
                VALUATION_SHEET,
                vec![
                    vec![CellValue::text("Metric"), CellValue::text("3/31/2025")],
                    vec![CellValue::text("Market Cap"), CellValue::text("2.9T")],
                ],
            )],
        )
        .unwrap();

    let summary = orchestrator.run(&[ReportKind::KeyStatistics]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.written, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(launcher.counters.launches.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.counters.pages_opened.load(Ordering::SeqCst), 2);
    assert_eq!(launcher.counters.pages_open.load(Ordering::SeqCst), 0);

    let cells = store.read_sheet(&path, VALUATION_SHEET).unwrap().unwrap();
    assert_eq!(
        cells[0],
        vec![
            CellValue::text("Metric"),
            CellValue::text("3/31/2025"),
            CellValue::text("Current"),
            CellValue::text("6/30/2025"),
        ]
    );
    assert_eq!(
        cells[1],
        vec![
            CellValue::text("Market Cap"),
            CellValue::text("2.9T"),
            CellValue::text("3.3T"),
            CellValue::text("3.0T"),
        ]
    );
    assert_eq!(cells.len(), 3);
}

#[tokio::test]
async fn test_earnings_calendar_sheet_named_after_run_date() {
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL"]);
    let documents = HashMap::from([
        (
            "http://calendar.test/calendar/earnings?symbol=AAPL&size=100&offset=0".to_string(),
            CALENDAR_HTML.to_string(),
        ),
        (
            "http://calendar.test/calendar/earnings?symbol=AAPL&size=100&offset=100".to_string(),
            EMPTY_PAGE_HTML.to_string(),
        ),
    ]);
    let orchestrator = Orchestrator::new(
        test_config(&dir, tickers),
        Arc::new(MockProvider::new()),
        Arc::new(MockLauncher::new(documents)),
    )
    .with_today(today());

    let summary = orchestrator.run(&[ReportKind::EarningsCalendar]).await.unwrap();
    assert_eq!(summary.reports[0].written, 1);

    let store = orchestrator.store();
    let cells = store
        .read_sheet(&store.valuation_path(&Ticker::from("AAPL")), "earnings_2025-06-30")
        .unwrap()
        .unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[1][0], CellValue::text("AAPL"));
    assert_eq!(cells[1][2], CellValue::text("2025-05-01"));
    assert_eq!(cells[1][4], CellValue::Number(-4.0));
}

#[tokio::test]
async fn test_browser_launch_failure_fails_every_ticker() {
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL", "MSFT"]);
    let orchestrator = Orchestrator::new(
        test_config(&dir, tickers),
        Arc::new(MockProvider::new()),
        Arc::new(BrokenLauncher),
    );

    let summary = orchestrator.run(&[ReportKind::KeyStatistics]).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed.iter().all(|(_, message)| message.contains("no browser binary")));
    assert!(summary.has_failures());
}

#[tokio::test]
async fn test_unreadable_ticker_list_fails_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, dir.path().join("missing.xlsx"));
    let orchestrator = orchestrator(config, MockProvider::new());

    let err = orchestrator.run(&ReportKind::all()).await.unwrap_err();
    assert_matches!(err, SheetsError::InputRead { .. });
}

#[tokio::test]
async fn test_financials_merge_every_stored_statement_in_one_write() {
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL"]);
    let statement = |end_date: i64, revenue: f64| serde_json::json!({"endDate": {"raw": end_date}, "totalRevenue": {"raw": revenue}});
    let provider = MockProvider::new().with_result(
        "AAPL",
        serde_json::json!({
            "incomeStatementHistory": {"incomeStatementHistory": [statement(1_704_067_200, 400.0)]},
            "incomeStatementHistoryQuarterly": {"incomeStatementHistory": [statement(1_719_792_000, 90.0)]}
        }),
    );
    let orchestrator = orchestrator(test_config(&dir, tickers), provider);
    let store = orchestrator.store();
    let path = store.valuation_path(&Ticker::from("AAPL"));
    store.ensure_output_dir().unwrap();
    let stored = |period: &str, revenue: f64| {
        vec![
            vec![CellValue::text("Metric"), CellValue::text(period)],
            vec![CellValue::text("totalRevenue"), CellValue::Number(revenue)],
        ]
    };
    store
        .upsert_sheets(
            &path,
            vec![
                Sheet::new("annual income statement", stored("2023-01-01", 350.0)),
                Sheet::new("Quarterly Income Statement", stored("2024-03-31", 85.0)),
                Sheet::new(PRICE_TARGET_SHEET, vec![vec![CellValue::text("Category")]]),
            ],
        )
        .unwrap();

    orchestrator.run(&[ReportKind::Financials]).await.unwrap();

    let workbook = store.load(&path).unwrap();
    assert_eq!(
        workbook.sheet_names(),
        vec![PRICE_TARGET_SHEET, "Annual Income Statement", "Quarterly Income Statement"]
    );
    assert_eq!(
        workbook.sheet("Annual Income Statement").unwrap().cells[1],
        vec![CellValue::text("totalRevenue"), CellValue::Number(350.0), CellValue::Number(400.0)]
    );
    assert_eq!(
        workbook.sheet("Quarterly Income Statement").unwrap().cells[0],
        vec![CellValue::text("Metric"), CellValue::text("2024-03-31"), CellValue::text("2024-07-01")]
    );
}

fn chart(timestamps: &[i64], closes: &[f64], dividends: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "meta": {"gmtoffset": -14400},
        "timestamp": timestamps,
        "events": {"dividends": dividends},
        "indicators": {
            "quote": [{"open": closes, "high": closes, "low": closes, "close": closes, "volume": vec![1000; closes.len()]}],
            "adjclose": [{"adjclose": closes}]
        }
    })
}

#[tokio::test]
async fn test_historical_prices_write_interval_and_dividend_sheets() {
    log_test_step("Daily and monthly charts for AAPL, no weekly chart");
    let dir = TempDir::new().unwrap();
    let tickers = write_tickers(dir.path(), &["AAPL"]);
    let dividend = serde_json::json!({"1715347800": {"amount": 0.25, "date": 1_715_347_800}});
    let provider = MockProvider::new()
        .with_result("AAPL", financial_data(200.0, "buy"))
        .with_chart("AAPL", "1d", chart(&[1_715_261_400, 1_715_347_800], &[182.5, 183.1], dividend.clone()))
        .with_chart("AAPL", "1mo", chart(&[1_714_536_000], &[190.0], dividend));
    let orchestrator = orchestrator(test_config(&dir, tickers), provider);

    let summary = orchestrator
        .run(&[ReportKind::PriceTarget, ReportKind::HistoricalPrices])
        .await
        .unwrap();

    assert_eq!(summary.reports[1].written, 1);
    let store = orchestrator.store();
    let workbook = store.load(&store.valuation_path(&Ticker::from("AAPL"))).unwrap();
    assert_eq!(
        workbook.sheet_names(),
        vec![PRICE_TARGET_SHEET, "Daily", "Monthly", "Dividends"]
    );

    let daily = &workbook.sheet("Daily").unwrap().cells;
    assert_eq!(daily.len(), 3);
    assert_eq!(daily[1][0], CellValue::date(NaiveDate::from_ymd_opt(2024, 5, 9).unwrap()));
    assert_eq!(daily[2][4], CellValue::Number(183.1));
    let monthly = &workbook.sheet("Monthly").unwrap().cells;
    assert_eq!(monthly[1][0], CellValue::date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
    assert_eq!(
        workbook.sheet("Dividends").unwrap().cells[1],
        vec![CellValue::date(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()), CellValue::Number(0.25)]
    );
}
