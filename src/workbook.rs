//! Workbook persistence: load the whole file, change sheets in memory, write
//! it back through a temporary file.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, XlsxError};
use tracing::{debug, warn};

use crate::error::{SheetsError, SheetsResult};
use crate::models::{CellValue, Sheet, Ticker, NOT_AVAILABLE};
use crate::utils::{parse_iso_datetime, to_excel_serial};

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Sheet names compare case-insensitively
pub fn same_sheet_name(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// A workbook held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| same_sheet_name(&sheet.name, name))
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str()).collect()
    }

    /// Drop any sheet called like `sheet` and append `sheet` at the end
    pub fn upsert(&mut self, sheet: Sheet) {
        self.sheets.retain(|existing| !same_sheet_name(&existing.name, &sheet.name));
        self.sheets.push(sheet);
    }
}

/// File layout and persistence of the output workbooks
#[derive(Debug, Clone)]
pub struct WorkbookStore {
    output_dir: PathBuf,
    recreate_corrupt: bool,
}

impl WorkbookStore {
    pub fn new(output_dir: impl Into<PathBuf>, recreate_corrupt: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            recreate_corrupt,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ensure_output_dir(&self) -> SheetsResult<()> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| SheetsError::store_write(&self.output_dir, e))
    }

    /// Per-ticker workbook shared by the merge-bearing reports
    pub fn valuation_path(&self, ticker: &Ticker) -> PathBuf {
        self.output_dir.join(format!("{}_valuation_measures.xlsx", ticker))
    }

    /// Standalone workbook of one report for one ticker
    pub fn report_path(&self, prefix: &str, ticker: &Ticker) -> PathBuf {
        self.output_dir.join(format!("{}_{}.xlsx", prefix, ticker))
    }

    /// Load a workbook, or an empty one if the file does not exist yet
    pub fn load(&self, path: &Path) -> SheetsResult<Workbook> {
        if !path.exists() {
            return Ok(Workbook::default());
        }

        match read_workbook(path) {
            Ok(workbook) => Ok(workbook),
            Err(reason) if self.recreate_corrupt => {
                warn!("⚠️ {} is unreadable ({}), starting a fresh workbook", path.display(), reason);
                Ok(Workbook::default())
            }
            Err(reason) => Err(SheetsError::store_write(path, reason)),
        }
    }

    /// Cell matrix of a named sheet, if the workbook and sheet exist
    pub fn read_sheet(&self, path: &Path, name: &str) -> SheetsResult<Option<Vec<Vec<CellValue>>>> {
        let workbook = self.load(path)?;
        Ok(workbook.sheet(name).map(|sheet| sheet.cells.clone()))
    }

    /// Load the workbook at `path` once, apply `change` and write it back
    pub fn update<F>(&self, path: &Path, change: F) -> SheetsResult<()>
    where
        F: FnOnce(&mut Workbook) -> SheetsResult<()>,
    {
        let mut workbook = self.load(path)?;
        change(&mut workbook)?;
        self.save(path, &workbook)
    }

    /// Replace the named sheets in the workbook at `path`, keeping the others
    pub fn upsert_sheets(&self, path: &Path, sheets: Vec<Sheet>) -> SheetsResult<()> {
        self.update(path, |workbook| {
            for sheet in sheets {
                workbook.upsert(sheet);
            }
            Ok(())
        })
    }

    /// Write a workbook holding exactly `sheets`, discarding any previous file
    pub fn replace_workbook(&self, path: &Path, sheets: Vec<Sheet>) -> SheetsResult<()> {
        self.save(path, &Workbook { sheets })
    }

    fn save(&self, path: &Path, workbook: &Workbook) -> SheetsResult<()> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SheetsError::store_write(path, "path has no file name"))?;
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        write_workbook(&temp_path, workbook).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            SheetsError::store_write(path, e)
        })?;
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            SheetsError::store_write(path, e)
        })?;

        debug!("Wrote {} sheet(s) to {}", workbook.sheets.len(), path.display());
        Ok(())
    }
}

/// Read every sheet. Formula cells come back as formulas, not as their cached
/// values, so that writing the workbook again keeps them.
fn read_workbook(path: &Path) -> Result<Workbook, String> {
    let mut source = open_workbook_auto(path).map_err(|e| e.to_string())?;
    let mut workbook = Workbook::default();

    for name in source.sheet_names() {
        let range = source.worksheet_range(&name).map_err(|e| e.to_string())?;
        let formulas = source.worksheet_formula(&name).map_err(|e| e.to_string())?;
        let (row_offset, col_offset) = range
            .start()
            .map(|(row, col)| (row as usize, col as usize))
            .unwrap_or((0, 0));

        let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut values = vec![CellValue::Empty; col_offset];
            values.extend(row.iter().map(cell_from_data));
            cells.push(values);
        }

        if let Some((first_row, first_col)) = formulas.start() {
            for (row, col, formula) in formulas.used_cells() {
                if formula.trim().is_empty() {
                    continue;
                }
                let row = first_row as usize + row;
                let col = first_col as usize + col;
                if cells.len() <= row {
                    cells.resize(row + 1, Vec::new());
                }
                let line = &mut cells[row];
                if line.len() <= col {
                    line.resize(col + 1, CellValue::Empty);
                }
                line[col] = CellValue::Formula(formula.trim_start_matches('=').to_string());
            }
        }

        workbook.sheets.push(Sheet::new(name, cells));
    }

    Ok(workbook)
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(text) if text == NOT_AVAILABLE => CellValue::NotAvailable,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Float(value) => CellValue::Number(*value),
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Bool(value) => CellValue::Bool(*value),
        Data::DateTime(value) => CellValue::Date(value.as_f64()),
        Data::DateTimeIso(text) => match parse_iso_datetime(text) {
            Some(datetime) => CellValue::Date(to_excel_serial(datetime)),
            None => CellValue::Text(text.clone()),
        },
        Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(error) => CellValue::Text(error.to_string()),
    }
}

fn write_workbook(path: &Path, workbook: &Workbook) -> Result<(), XlsxError> {
    let mut output = XlsxWorkbook::new();
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    let datetime_format = Format::new().set_num_format(DATETIME_FORMAT);

    for sheet in &workbook.sheets {
        let worksheet = output.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (row_index, row) in sheet.cells.iter().enumerate() {
            let row_num = row_index as u32;
            for (col_index, cell) in row.iter().enumerate() {
                let col_num = u16::try_from(col_index)
                    .map_err(|_| XlsxError::RowColumnLimitError)?;
                match cell {
                    CellValue::Empty => {}
                    CellValue::Text(text) => {
                        worksheet.write_string(row_num, col_num, text)?;
                    }
                    CellValue::Number(value) => {
                        worksheet.write_number(row_num, col_num, *value)?;
                    }
                    CellValue::Bool(value) => {
                        worksheet.write_boolean(row_num, col_num, *value)?;
                    }
                    CellValue::NotAvailable => {
                        worksheet.write_string(row_num, col_num, NOT_AVAILABLE)?;
                    }
                    CellValue::Date(serial) => {
                        let format = if serial.fract() == 0.0 { &date_format } else { &datetime_format };
                        worksheet.write_number_with_format(row_num, col_num, *serial, format)?;
                    }
                    CellValue::Formula(formula) => {
                        worksheet.write_formula(row_num, col_num, formula.as_str())?;
                    }
                }
            }
        }
    }

    output.save(path)
}
