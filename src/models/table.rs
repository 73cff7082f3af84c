use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};

use super::MissingCellPolicy;
use crate::utils::{format_excel_serial, to_excel_serial};

/// Text written for values the source does not provide
pub const NOT_AVAILABLE: &str = "N/A";

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    NotAvailable,
    /// Date or date-time as a spreadsheet serial number
    Date(f64),
    /// Formula text without the leading `=`
    Formula(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn date(date: NaiveDate) -> Self {
        CellValue::Date(to_excel_serial(date.and_time(NaiveTime::MIN)))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Number when present, `N/A` otherwise
    pub fn number_or_na(value: Option<f64>) -> Self {
        value.map(CellValue::Number).unwrap_or(CellValue::NotAvailable)
    }

    /// Text when present and non-blank, `N/A` otherwise
    pub fn text_or_na(value: Option<&str>) -> Self {
        match value {
            Some(text) if !text.trim().is_empty() => CellValue::text(text),
            _ => CellValue::NotAvailable,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{}", value)
                }
            }
            CellValue::Bool(value) => write!(f, "{}", value),
            CellValue::NotAvailable => f.write_str(NOT_AVAILABLE),
            CellValue::Date(serial) => match format_excel_serial(*serial) {
                Some(text) => f.write_str(&text),
                None => write!(f, "{}", serial),
            },
            CellValue::Formula(formula) => write!(f, "={}", formula),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

/// A keyed row: the key lives outside `cells`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub key: String,
    pub cells: HashMap<String, CellValue>,
}

impl Row {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cells: HashMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }
}

/// Rows sharing a column schema, identified by a key column
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub key_column: String,
    /// Value columns in display order; the key column is implicit and always first
    pub columns: Vec<String>,
    rows: Vec<Row>,
    /// Row key → position in `rows`
    index: HashMap<String, usize>,
}

impl Table {
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_columns<I, S>(key_column: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(key_column);
        for column in columns {
            table.push_column(column);
        }
        table
    }

    /// Append a value column unless it is already present
    pub fn push_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if column != self.key_column && !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    /// Insert a row. A repeated key overwrites the earlier row's values in place.
    pub fn upsert_row(&mut self, row: Row) {
        match self.index.get(&row.key) {
            Some(&position) => self.rows[position].cells.extend(row.cells),
            None => {
                self.index.insert(row.key.clone(), self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub fn row(&self, key: &str) -> Option<&Row> {
        self.index.get(key).map(|&position| &self.rows[position])
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Stable sort of the rows by key
    pub fn sort_rows_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&str, &str) -> Ordering,
    {
        self.rows.sort_by(|a, b| compare(&a.key, &b.key));
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| (row.key.clone(), position))
            .collect();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.key.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Full header: key column then value columns
    pub fn header(&self) -> Vec<String> {
        std::iter::once(self.key_column.clone())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    /// Read a table back from a sheet whose first row is the header.
    ///
    /// Blank header cells are dropped, rows with a blank key are skipped, and if
    /// the key column is absent the table keeps the header but no rows.
    pub fn from_matrix(matrix: &[Vec<CellValue>], key_column: &str) -> Self {
        let mut table = Table::new(key_column);
        let Some((header, body)) = matrix.split_first() else {
            return table;
        };

        let header: Vec<Option<String>> = header
            .iter()
            .map(|cell| {
                let name = cell.to_string().trim().to_string();
                (!name.is_empty()).then_some(name)
            })
            .collect();
        for name in header.iter().flatten() {
            table.push_column(name.clone());
        }

        let Some(key_index) = header
            .iter()
            .position(|name| name.as_deref() == Some(key_column))
        else {
            return table;
        };

        for cells in body {
            let key = match cells.get(key_index) {
                Some(cell) if !cell.is_empty() => cell.to_string().trim().to_string(),
                _ => continue,
            };
            let mut row = Row::new(key);
            for (index, cell) in cells.iter().enumerate() {
                if index == key_index || cell.is_empty() {
                    continue;
                }
                if let Some(Some(column)) = header.get(index) {
                    row.set(column.clone(), cell.clone());
                }
            }
            table.upsert_row(row);
        }

        table
    }

    /// Render the table as a cell matrix with a header row
    pub fn to_matrix(&self, missing: MissingCellPolicy) -> Vec<Vec<CellValue>> {
        let filler = match missing {
            MissingCellPolicy::Unset => CellValue::Empty,
            MissingCellPolicy::Sentinel => CellValue::NotAvailable,
        };

        let mut matrix = Vec::with_capacity(self.rows.len() + 1);
        matrix.push(self.header().into_iter().map(CellValue::Text).collect());
        for row in &self.rows {
            let mut cells = Vec::with_capacity(self.columns.len() + 1);
            cells.push(CellValue::text(row.key.clone()));
            for column in &self.columns {
                cells.push(row.get(column).cloned().unwrap_or_else(|| filler.clone()));
            }
            matrix.push(cells);
        }
        matrix
    }
}

/// A named cell matrix inside a workbook
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub cells: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, cells: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Header row plus one row per record, in the given column order
    pub fn from_records(name: impl Into<String>, columns: &[&str], records: Vec<Vec<CellValue>>) -> Self {
        let mut cells = Vec::with_capacity(records.len() + 1);
        cells.push(columns.iter().map(|column| CellValue::text(*column)).collect());
        cells.extend(records);
        Self::new(name, cells)
    }
}
