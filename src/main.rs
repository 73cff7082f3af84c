use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stock_workbooks::{
    api::YahooClient,
    models::{Config, MissingCellPolicy},
    orchestrator::Orchestrator,
    reports::ReportKind,
    scrape::HttpBrowserLauncher,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Refresh per-ticker financial workbooks", long_about = None)]
struct Args {
    /// Spreadsheet or CSV holding the ticker list
    #[arg(short, long)]
    tickers: Option<PathBuf>,

    /// Header of the ticker column
    #[arg(long)]
    ticker_column: Option<String>,

    /// Directory the workbooks are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of tickers fetched at once
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Attempts per ticker before giving up
    #[arg(short, long)]
    retries: Option<u32>,

    /// Pause between attempts, in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// How merged cells without a value are written
    #[arg(long, value_enum)]
    missing_cells: Option<MissingCellPolicy>,

    /// Report to run; repeat for several (default: all)
    #[arg(long = "report", value_enum)]
    reports: Vec<ReportKind>,

    /// Start over when an existing workbook cannot be read
    #[arg(long)]
    recreate_corrupt: bool,

    /// Save the page of a failed scrape next to the workbooks
    #[arg(long)]
    snapshot_on_error: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.tickers {
            config.tickers_path = path.clone();
        }
        if let Some(column) = &self.ticker_column {
            config.ticker_column = column.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency_limit = concurrency;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay_ms {
            config.retry_delay = Duration::from_millis(delay);
        }
        if let Some(policy) = self.missing_cells {
            config.missing_cells = policy;
        }
        config.recreate_corrupt_workbooks |= self.recreate_corrupt;
        config.snapshot_on_error |= self.snapshot_on_error;
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "stock_workbooks=debug" } else { "stock_workbooks=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    info!("🚀 Starting stock workbook refresh");

    let config = Config::from_env().and_then(|mut config| {
        args.apply(&mut config);
        config.validate()?;
        Ok(config)
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    };

    let reports = if args.reports.is_empty() {
        ReportKind::all()
    } else {
        args.reports.clone()
    };
    info!("📋 Tickers from {}", config.tickers_path.display());
    info!("📁 Writing to {}", config.output_dir.display());
    info!("🧵 Concurrency: {}, 🔄 attempts: {}", config.concurrency_limit, config.max_retries);

    let provider = Arc::new(YahooClient::new(&config)?);
    let launcher = Arc::new(HttpBrowserLauncher::new(config.scrape.clone()));
    let orchestrator = Orchestrator::new(config, provider, launcher);

    match orchestrator.run(&reports).await {
        Ok(summary) => {
            summary.log();
            if summary.has_failures() {
                std::process::exit(2);
            }
            info!("🎉 All reports written");
            Ok(())
        }
        Err(e) => {
            error!("❌ Run aborted: {}", e);
            std::process::exit(1);
        }
    }
}
