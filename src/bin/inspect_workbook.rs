//! Print the sheets of a workbook and their first rows

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use stock_workbooks::workbook::{same_sheet_name, WorkbookStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workbook to inspect
    path: PathBuf,

    /// Rows to show per sheet
    #[arg(short, long, default_value_t = 5)]
    rows: usize,

    /// Only show this sheet
    #[arg(short, long)]
    sheet: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let dir = args.path.parent().map(PathBuf::from).unwrap_or_default();
    let store = WorkbookStore::new(dir, false);
    let workbook = store.load(&args.path)?;

    if workbook.sheets.is_empty() {
        println!("⚠️ {} has no sheets (or does not exist)", args.path.display());
        return Ok(());
    }

    println!("📒 {}: {} sheet(s)", args.path.display(), workbook.sheets.len());
    for sheet in &workbook.sheets {
        if args.sheet.as_deref().is_some_and(|wanted| !same_sheet_name(wanted, &sheet.name)) {
            continue;
        }

        println!();
        println!("📄 {} ({} row(s))", sheet.name, sheet.cells.len());
        println!("{}", "=".repeat(60));
        for row in sheet.cells.iter().take(args.rows) {
            let line: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
            println!("  {}", line.join(" | "));
        }
    }

    Ok(())
}
