//! Merge behavior over tables read back from stored sheets

use pretty_assertions::assert_eq;
use test_log::test;

use stock_workbooks::merge::merge_tables;
use stock_workbooks::models::{CellValue, MissingCellPolicy, Row, Table};

fn stored(rows: &[&[&str]]) -> Vec<Vec<CellValue>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|cell| if cell.is_empty() { CellValue::Empty } else { CellValue::text(*cell) })
                .collect()
        })
        .collect()
}

#[test]
fn test_merge_with_stored_sheet_keeps_history() {
    let existing = Table::from_matrix(
        &stored(&[
            &["Metric", "3/31/2025", "Current"],
            &["Market Cap", "2.9T", "3.1T"],
            &["Forward P/E", "28.0", ""],
        ]),
        "Metric",
    );
    let mut incoming = Table::with_columns("Metric", ["Current", "6/30/2025"]);
    incoming.upsert_row(Row::new("Market Cap").with("Current", "3.3T").with("6/30/2025", "3.0T"));
    incoming.upsert_row(Row::new("Enterprise Value").with("Current", "3.2T"));

    let merged = merge_tables(&existing, &incoming);
    let matrix = merged.to_matrix(MissingCellPolicy::Sentinel);

    assert_eq!(
        matrix,
        vec![
            vec![
                CellValue::text("Metric"),
                CellValue::text("3/31/2025"),
                CellValue::text("Current"),
                CellValue::text("6/30/2025"),
            ],
            vec![
                CellValue::text("Enterprise Value"),
                CellValue::NotAvailable,
                CellValue::text("3.2T"),
                CellValue::NotAvailable,
            ],
            vec![
                CellValue::text("Forward P/E"),
                CellValue::text("28.0"),
                CellValue::NotAvailable,
                CellValue::NotAvailable,
            ],
            vec![
                CellValue::text("Market Cap"),
                CellValue::text("2.9T"),
                CellValue::text("3.3T"),
                CellValue::text("3.0T"),
            ],
        ]
    );
}

#[test]
fn test_merge_twice_equals_merge_once() {
    let existing = Table::from_matrix(&stored(&[&["Metric", "2023"], &["PE", "10"]]), "Metric");
    let mut incoming = Table::with_columns("Metric", ["2024"]);
    incoming.upsert_row(Row::new("PE").with("2024", 12.0));
    incoming.upsert_row(Row::new("PB").with("2024", 3.0));

    let once = merge_tables(&existing, &incoming);
    let twice = merge_tables(&once, &incoming);
    assert_eq!(once, twice);
}

#[test]
fn test_stored_sheet_without_key_column_contributes_no_rows() {
    let existing = Table::from_matrix(&stored(&[&["Label", "2023"], &["PE", "10"]]), "Metric");
    let mut incoming = Table::with_columns("Metric", ["2024"]);
    incoming.upsert_row(Row::new("PE").with("2024", 12.0));

    let merged = merge_tables(&existing, &incoming);
    assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["PE"]);
    assert_eq!(merged.row("PE").unwrap().get("2024"), Some(&CellValue::Number(12.0)));
}

#[test]
fn test_unset_policy_leaves_blank_cells() {
    let mut incoming = Table::with_columns("Metric", ["2023", "2024"]);
    incoming.upsert_row(Row::new("PE").with("2024", 12.0));

    let merged = merge_tables(&Table::new("Metric"), &incoming);
    let matrix = merged.to_matrix(MissingCellPolicy::Unset);
    assert_eq!(matrix[1], vec![CellValue::text("PE"), CellValue::Empty, CellValue::Number(12.0)]);
}
