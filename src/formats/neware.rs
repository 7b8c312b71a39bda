//! Neware format reader.
//!
//! Neware exports are `.xlsx` workbooks whose `record` sheet holds one row
//! per sample. The instrument logs an absolute `Date` column but no elapsed
//! time, so rows are sorted chronologically and an elapsed-seconds column is
//! synthesized from the timestamps. Capacity arrives as separate monotonic
//! charge/discharge counters that the pipeline combines downstream.

use calamine::{Data, Range, Reader, Xlsx, XlsxError, open_workbook};
use polars::prelude::*;
use std::path::Path;

use crate::error::{CyclerError, Result};
use crate::formats::{ColumnDictionary, CyclerFormat};
use crate::units::NamePattern;

const NAME_PATTERN: &str = r"^(.+)\((.+)\)$";
const RECORD_SHEET: &str = "record";
const DATE_COLUMN: &str = "Date";
const ELAPSED_COLUMN: &str = "Time(s)";

/// Reader for Neware workbook exports.
pub struct Neware {
    dictionary: ColumnDictionary,
    pattern: NamePattern,
}

impl Neware {
    pub fn new() -> Self {
        Self {
            dictionary: ColumnDictionary::from_pairs(&[
                ("Date", DATE_COLUMN),
                ("Time", "Time(*)"),
                ("Step", "Step Index"),
                ("Current", "Current(*)"),
                ("Voltage", "Voltage(*)"),
                ("Charge Capacity", "Chg. Cap.(*)"),
                ("Discharge Capacity", "DChg. Cap.(*)"),
                ("Temperature", "T1(*)"),
            ]),
            pattern: NamePattern::new(NAME_PATTERN).expect("built-in column name pattern is valid"),
        }
    }
}

impl Default for Neware {
    fn default() -> Self {
        Self::new()
    }
}

impl CyclerFormat for Neware {
    fn name(&self) -> &'static str {
        "neware"
    }

    fn read_file(&self, path: &Path) -> Result<LazyFrame> {
        let mut workbook: Xlsx<_> =
            open_workbook(path).map_err(|e: XlsxError| CyclerError::spreadsheet(path, e.to_string()))?;
        let range = workbook
            .worksheet_range(RECORD_SHEET)
            .map_err(|e| CyclerError::spreadsheet(path, e.to_string()))?;

        let df = range_to_dataframe(&range, path)?;
        let df = df.sort([DATE_COLUMN], SortMultipleOptions::default())?;
        Ok(with_elapsed_time(df.lazy()))
    }

    fn column_dictionary(&self) -> &ColumnDictionary {
        &self.dictionary
    }

    fn name_pattern(&self) -> &NamePattern {
        &self.pattern
    }
}

/// Synthesize elapsed seconds from the sorted absolute timestamps.
pub(crate) fn with_elapsed_time(frame: LazyFrame) -> LazyFrame {
    let elapsed = (col(DATE_COLUMN) - col(DATE_COLUMN).first())
        .cast(DataType::Int64)
        .cast(DataType::Float64)
        / lit(1_000_000.0);
    frame.with_column(elapsed.alias(ELAPSED_COLUMN))
}

/// Convert the record sheet into a typed DataFrame. The first row is the
/// column header row; each column's type is classified from its first
/// non-empty cell (datetime, numeric, or text).
fn range_to_dataframe(range: &Range<Data>, path: &Path) -> Result<DataFrame> {
    let mut rows = range.rows();
    let header_row = rows.next().ok_or_else(|| {
        CyclerError::malformed_header(path, format!("sheet '{RECORD_SHEET}' is empty"))
    })?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();
    let data_rows: Vec<&[Data]> = rows.collect();

    let mut columns = Vec::with_capacity(headers.len());
    for (index, name) in headers.iter().enumerate() {
        columns.push(column_from_cells(name, index, &data_rows)?);
    }
    DataFrame::new(columns).map_err(Into::into)
}

fn column_from_cells(name: &str, index: usize, rows: &[&[Data]]) -> Result<Column> {
    let first_value = rows
        .iter()
        .filter_map(|row| row.get(index))
        .find(|cell| !matches!(cell, Data::Empty));

    match first_value {
        Some(Data::DateTime(_)) => {
            let values: Vec<Option<i64>> = rows
                .iter()
                .map(|row| match row.get(index) {
                    Some(Data::DateTime(dt)) => dt
                        .as_datetime()
                        .map(|datetime| datetime.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect();
            Column::new(name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                .map_err(Into::into)
        }
        Some(Data::Float(_)) | Some(Data::Int(_)) => {
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|row| match row.get(index) {
                    Some(Data::Float(value)) => Some(*value),
                    Some(Data::Int(value)) => Some(*value as f64),
                    Some(Data::String(text)) => text.trim().parse().ok(),
                    _ => None,
                })
                .collect();
            Ok(Column::new(name.into(), values))
        }
        _ => {
            let values: Vec<Option<String>> = rows
                .iter()
                .map(|row| {
                    row.get(index).and_then(|cell| match cell {
                        Data::Empty => None,
                        other => Some(other.to_string()),
                    })
                })
                .collect();
            Ok(Column::new(name.into(), values))
        }
    }
}
