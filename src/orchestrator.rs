use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{error, info, warn};

use crate::api::QuoteSummaryProvider;
use crate::concurrent_fetcher::{run_bounded, BatchStats, RetryPolicy, TaskOutcome};
use crate::error::{SheetsError, SheetsResult};
use crate::fetcher::{FetchTask, RawPayload, RemoteFetcher};
use crate::merge::merge_tables;
use crate::models::{Config, Sheet, Table, Ticker};
use crate::reports::{Destination, ReportKind, SheetContent, SheetUpdate};
use crate::scrape::BrowserLauncher;
use crate::tickers::TickerSource;
use crate::workbook::WorkbookStore;

/// Result of one report over all tickers
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub report: ReportKind,
    pub written: usize,
    pub skipped: usize,
    pub failed: Vec<(Ticker, String)>,
    pub stats: BatchStats,
}

impl ReportSummary {
    fn new(report: ReportKind) -> Self {
        Self {
            report,
            written: 0,
            skipped: 0,
            failed: Vec::new(),
            stats: BatchStats::default(),
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub tickers: usize,
    pub reports: Vec<ReportSummary>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|report| !report.failed.is_empty())
    }

    pub fn log(&self) {
        info!("📊 Run summary for {} ticker(s):", self.tickers);
        for report in &self.reports {
            info!(
                "   {}: {} written, {} skipped, {} failed",
                report.report,
                report.written,
                report.skipped,
                report.failed.len()
            );
            for (ticker, message) in &report.failed {
                warn!("      ❌ {}: {}", ticker, message);
            }
        }
    }
}

/// Drives every requested report over the ticker list
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn QuoteSummaryProvider>,
    launcher: Arc<dyn BrowserLauncher>,
    store: WorkbookStore,
    today: NaiveDate,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn QuoteSummaryProvider>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        let store = WorkbookStore::new(&config.output_dir, config.recreate_corrupt_workbooks);
        Self {
            config,
            provider,
            launcher,
            store,
            today: Local::now().date_naive(),
        }
    }

    /// Date used for relative periods and dated sheet names
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn store(&self) -> &WorkbookStore {
        &self.store
    }

    /// Load the tickers once, then run each report in turn.
    ///
    /// Only an unreadable ticker list or output directory fails the run;
    /// per-ticker problems end up in the summary.
    pub async fn run(&self, reports: &[ReportKind]) -> SheetsResult<RunSummary> {
        let tickers = TickerSource::load(&self.config.tickers_path, &self.config.ticker_column)?;
        self.store.ensure_output_dir()?;

        let mut summary = RunSummary {
            tickers: tickers.len(),
            reports: Vec::with_capacity(reports.len()),
        };
        for report in reports {
            summary.reports.push(self.run_report(*report, &tickers).await);
        }
        Ok(summary)
    }

    /// Fetch one report for every ticker, then shape and write the results
    pub async fn run_report(&self, report: ReportKind, tickers: &[Ticker]) -> ReportSummary {
        info!("🔄 Starting {} for {} ticker(s)", report, tickers.len());
        let mut summary = ReportSummary::new(report);

        let tasks: Vec<FetchTask> = tickers
            .iter()
            .map(|ticker| FetchTask::new(ticker.clone(), report.target()))
            .collect();
        let policy = RetryPolicy::from_config(&self.config);

        let outcomes = if report.is_scraped() {
            let browser = match self.launcher.launch().await {
                Ok(browser) => browser,
                Err(e) => {
                    error!("❌ Could not start a browser for {}: {:#}", report, e);
                    let message = format!("browser launch failed: {:#}", e);
                    summary.failed = tickers
                        .iter()
                        .map(|ticker| (ticker.clone(), message.clone()))
                        .collect();
                    return summary;
                }
            };

            let fetcher = RemoteFetcher::Scraped {
                browser: browser.clone(),
                settings: self.config.scrape.clone(),
                snapshot_dir: self.snapshot_dir(),
            };
            let outcomes = fetch_all(&fetcher, tasks, &policy).await;

            if let Err(e) = browser.close().await {
                warn!("Closing the browser failed: {:#}", e);
            }
            outcomes
        } else {
            let fetcher = RemoteFetcher::Structured(self.provider.clone());
            fetch_all(&fetcher, tasks, &policy).await
        };

        summary.stats = BatchStats::from_outcomes(&outcomes);
        for outcome in outcomes {
            self.settle(report, outcome, &mut summary);
        }

        info!(
            "✅ {} finished: {} written, {} skipped, {} failed",
            report,
            summary.written,
            summary.skipped,
            summary.failed.len()
        );
        summary
    }

    fn snapshot_dir(&self) -> Option<PathBuf> {
        self.config
            .snapshot_on_error
            .then(|| self.config.output_dir.clone())
    }

    /// Shape and write one task's outcome, recording how it ended
    fn settle(&self, report: ReportKind, outcome: TaskOutcome<Option<RawPayload>>, summary: &mut ReportSummary) {
        let ticker = outcome.task.ticker;

        let result = match outcome.result {
            Ok(Some(payload)) => report
                .shape(&ticker, payload, self.today)
                .and_then(|updates| self.write(report, &ticker, updates)),
            Ok(None) => Err(SheetsError::missing(ticker.as_str(), report.name())),
            Err(e) => Err(e),
        };

        match result {
            Ok(path) => {
                info!("✅ {}: {} written to {}", ticker, report, path.display());
                summary.written += 1;
            }
            Err(SheetsError::MissingData { what, .. }) => {
                info!("⚠️ {}: no {} data, nothing written", ticker, what);
                summary.skipped += 1;
            }
            Err(e) => {
                error!("❌ {}: {}", ticker, e);
                summary.failed.push((ticker, e.to_string()));
            }
        }
    }

    fn write(&self, report: ReportKind, ticker: &Ticker, updates: Vec<SheetUpdate>) -> SheetsResult<PathBuf> {
        match report.destination() {
            Destination::Valuation => {
                let path = self.store.valuation_path(ticker);
                self.store.update(&path, |workbook| {
                    for update in updates {
                        let sheet = self.materialize(workbook.sheet(&update.name), update);
                        workbook.upsert(sheet);
                    }
                    Ok(())
                })?;
                Ok(path)
            }
            Destination::Standalone(prefix) => {
                let path = self.store.report_path(prefix, ticker);
                let sheets = updates
                    .into_iter()
                    .map(|update| self.materialize(None, update))
                    .collect();
                self.store.replace_workbook(&path, sheets)?;
                Ok(path)
            }
        }
    }

    /// Turn an update into the sheet to store, merging with the `stored` sheet
    fn materialize(&self, stored: Option<&Sheet>, update: SheetUpdate) -> Sheet {
        match update.content {
            SheetContent::Cells(cells) => Sheet::new(update.name, cells),
            SheetContent::Merged(incoming) => {
                let existing = match stored {
                    Some(sheet) => Table::from_matrix(&sheet.cells, &incoming.key_column),
                    None => Table::new(incoming.key_column.clone()),
                };
                let merged = merge_tables(&existing, &incoming);
                Sheet::new(update.name, merged.to_matrix(self.config.missing_cells))
            }
        }
    }
}

async fn fetch_all(
    fetcher: &RemoteFetcher,
    tasks: Vec<FetchTask>,
    policy: &RetryPolicy,
) -> Vec<TaskOutcome<Option<RawPayload>>> {
    run_bounded(tasks, policy, |task| async move { fetcher.fetch(&task).await }).await
}
