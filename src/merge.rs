//! Keyed reconciliation of a freshly fetched table with the persisted one.

use std::cmp::Ordering;
use std::collections::HashMap;

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::models::{Row, Table};

/// Merge `incoming` into `existing`, keyed by the existing table's key column.
///
/// Existing columns keep their order and new ones are appended in incoming
/// order. Incoming values overwrite existing ones, values the incoming row does
/// not supply are kept, and rows only present in `existing` are carried over.
/// The result is sorted by key with [`locale_compare`].
pub fn merge_tables(existing: &Table, incoming: &Table) -> Table {
    let mut merged = Table::new(existing.key_column.clone());
    for column in existing.columns.iter().chain(incoming.columns.iter()) {
        merged.push_column(column.clone());
    }

    let existing_by_key: HashMap<&str, &Row> = existing
        .rows()
        .iter()
        .map(|row| (row.key.as_str(), row))
        .collect();

    for new_row in incoming.rows() {
        let mut row = existing_by_key
            .get(new_row.key.as_str())
            .map(|row| (*row).clone())
            .unwrap_or_else(|| Row::new(new_row.key.clone()));
        for column in &incoming.columns {
            if let Some(value) = new_row.get(column) {
                row.set(column.clone(), value.clone());
            }
        }
        merged.upsert_row(row);
    }

    for old_row in existing.rows() {
        if merged.row(&old_row.key).is_none() {
            merged.upsert_row(old_row.clone());
        }
    }

    merged.sort_rows_by(locale_compare);
    merged
}

/// Collation close to a default locale comparison: letters compare without
/// regard to accents or case first, then accented after plain, then lowercase
/// before uppercase.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let primary = |s: &str| -> String {
        s.nfd()
            .filter(|c| !is_combining_mark(*c))
            .flat_map(char::to_lowercase)
            .collect()
    };
    let secondary = |s: &str| -> String { s.nfd().flat_map(char::to_lowercase).collect() };
    let tertiary = |s: &str| -> Vec<(bool, char)> {
        s.nfd().map(|c| (c.is_uppercase(), c)).collect()
    };

    primary(a)
        .cmp(&primary(b))
        .then_with(|| secondary(a).cmp(&secondary(b)))
        .then_with(|| tertiary(a).cmp(&tertiary(b)))
}
