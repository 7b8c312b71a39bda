//! Biologic EC-Lab format reader.
//!
//! EC-Lab `.mpt` exports are tab-separated text in windows-1252 encoding
//! with a variable-length header block. The header length is itself encoded
//! in an early header line (`"Nb header lines : 57"`), so reading is a
//! two-pass affair: scan the header to learn the line count and the
//! acquisition start timestamp, then parse the table skipping exactly that
//! many lines. The instrument logs only elapsed time, so the absolute
//! `Date` column is synthesized from the start timestamp.

use chrono::NaiveDateTime;
use encoding_rs::WINDOWS_1252;
use polars::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::error::{CyclerError, Result};
use crate::formats::{ColumnDictionary, CyclerFormat};
use crate::schema::SOURCE_FILE;
use crate::units::NamePattern;

const NAME_PATTERN: &str = r"^(.+)/(.+)$";
const HEADER_COUNT_MARKER: &str = "Nb header lines";
const START_TIME_MARKER: &str = "Acquisition started on";
const ELAPSED_COLUMN: &str = "time/s";
const STEP_COLUMN: &str = "Ns";

/// Reader for single-file Biologic procedures.
pub struct Biologic {
    dictionary: ColumnDictionary,
    pattern: NamePattern,
}

impl Biologic {
    pub fn new() -> Self {
        Self {
            dictionary: ColumnDictionary::from_pairs(&[
                ("Date", "Date"),
                ("Time", "time/*"),
                ("Step", STEP_COLUMN),
                ("Current", "I/*"),
                ("Voltage", "Ecell/*"),
                ("Charge Capacity", "Q charge/*"),
                ("Discharge Capacity", "Q discharge/*"),
                ("Temperature", "Temperature/*"),
            ]),
            pattern: NamePattern::new(NAME_PATTERN).expect("built-in column name pattern is valid"),
        }
    }
}

impl Default for Biologic {
    fn default() -> Self {
        Self::new()
    }
}

impl CyclerFormat for Biologic {
    fn name(&self) -> &'static str {
        "biologic"
    }

    fn read_file(&self, path: &Path) -> Result<LazyFrame> {
        let raw = fs::read(path)?;
        let (text, _, _) = WINDOWS_1252.decode(&raw);
        let (header_lines, start_time) = parse_header(&text, path)?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_skip_rows(header_lines - 1)
            .with_infer_schema_length(Some(0))
            .with_parse_options(CsvParseOptions::default().with_separator(b'\t'))
            .into_reader_with_file_handle(Cursor::new(text.as_bytes()))
            .finish()?;

        // elapsed time is non-negative; round half-up so the integer cast
        // does not truncate values like 1.002823 s to 1002822 us
        let elapsed_micros = (col(ELAPSED_COLUMN).cast(DataType::Float64) * lit(1_000_000.0)
            + lit(0.5))
        .cast(DataType::Int64)
        .cast(DataType::Duration(TimeUnit::Microseconds));
        Ok(df
            .lazy()
            .with_column((lit(start_time) + elapsed_micros).alias("Date")))
    }

    fn column_dictionary(&self) -> &ColumnDictionary {
        &self.dictionary
    }

    fn name_pattern(&self) -> &NamePattern {
        &self.pattern
    }

    // Ns counts from 0
    fn step_adjustment(&self) -> i64 {
        1
    }
}

/// Reader for Biologic Modulo Bat procedures, where one test is split into
/// several files and the hardware restarts the step counter in each one.
pub struct BiologicMb {
    inner: Biologic,
}

impl BiologicMb {
    pub fn new() -> Self {
        Self {
            inner: Biologic::new(),
        }
    }
}

impl Default for BiologicMb {
    fn default() -> Self {
        Self::new()
    }
}

impl CyclerFormat for BiologicMb {
    fn name(&self) -> &'static str {
        "biologic-mb"
    }

    fn read_file(&self, path: &Path) -> Result<LazyFrame> {
        self.inner.read_file(path)
    }

    fn column_dictionary(&self) -> &ColumnDictionary {
        self.inner.column_dictionary()
    }

    fn name_pattern(&self) -> &NamePattern {
        self.inner.name_pattern()
    }

    fn common_suffix(&self) -> &str {
        "_MB"
    }

    fn step_adjustment(&self) -> i64 {
        1
    }

    fn post_concat_correction(&self, frame: LazyFrame) -> Result<LazyFrame> {
        correct_multi_file_steps(frame, STEP_COLUMN)
    }
}

/// Make a per-file-resetting step counter monotonic across the whole set.
///
/// For each source file the maximum raw step plus one is computed; the
/// cumulative sums of these maxima, shifted by one file, are joined back on
/// the source-file tag and added to every row's raw step. Must run after
/// vertical concatenation and before cycle/event derivation, which depend
/// on step monotonicity.
pub(crate) fn correct_multi_file_steps(frame: LazyFrame, step_column: &str) -> Result<LazyFrame> {
    const OFFSET: &str = "Step Offset";

    let offsets = frame
        .clone()
        .group_by([col(SOURCE_FILE)])
        .agg([(col(step_column).cast(DataType::Int64).max() + lit(1)).alias(OFFSET)])
        .sort([SOURCE_FILE], SortMultipleOptions::default())
        .with_column(col(OFFSET).cum_sum(false))
        // each file's cumulative maximum offsets the NEXT file
        .with_column(col(SOURCE_FILE) + lit(1));

    let mut args = JoinArgs::new(JoinType::Left);
    args.maintain_order = MaintainOrderJoin::Left;

    Ok(frame
        .join(offsets, [col(SOURCE_FILE)], [col(SOURCE_FILE)], args)
        .with_column(
            (col(step_column).cast(DataType::Int64) + col(OFFSET).fill_null(lit(0)))
                .alias(step_column),
        ))
}

/// Scan the decoded header: learn the header line count from the second
/// line, then find the acquisition start timestamp within the header block.
fn parse_header(text: &str, path: &Path) -> Result<(usize, NaiveDateTime)> {
    let mut lines = text.lines();
    lines.next();
    let count_line = lines.next().ok_or_else(|| {
        CyclerError::malformed_header(path, "file has fewer than two header lines")
    })?;
    if !count_line.contains(HEADER_COUNT_MARKER) {
        return Err(CyclerError::malformed_header(
            path,
            format!("'{HEADER_COUNT_MARKER}' marker missing from line 2"),
        ));
    }
    let header_lines: usize = count_line
        .split(':')
        .nth(1)
        .map(str::trim)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| {
            CyclerError::malformed_header(path, format!("unparsable header line count: {count_line}"))
        })?;

    let start_line = text
        .lines()
        .take(header_lines)
        .find(|line| line.contains(START_TIME_MARKER))
        .ok_or_else(|| {
            CyclerError::malformed_header(path, format!("'{START_TIME_MARKER}' line missing"))
        })?;
    let value = start_line
        .splitn(2, " : ")
        .nth(1)
        .map(str::trim)
        .ok_or_else(|| {
            CyclerError::malformed_header(path, format!("unparsable start timestamp: {start_line}"))
        })?;
    let start_time = NaiveDateTime::parse_from_str(value, "%m/%d/%Y %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%m/%d/%Y %H:%M:%S"))
        .map_err(|e| {
            CyclerError::malformed_header(path, format!("unparsable start timestamp '{value}': {e}"))
        })?;

    Ok((header_lines, start_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "EC-Lab ASCII FILE\n\
Nb header lines : 5\n\
Acquisition started on : 08/07/2024 10:00:00.000\n\
Technique : GCPL\n\
mode\ttime/s\tNs\tI/mA\tEcell/V\tQ charge/mA.h\tQ discharge/mA.h\n\
1\t0.0\t0\t10.0\t3.600\t0.0\t0.0\n\
1\t1.5\t0\t10.0\t3.610\t10.0\t0.0\n";

    #[test]
    fn test_parse_header() {
        let (header_lines, start_time) = parse_header(SAMPLE, Path::new("sample.mpt")).unwrap();
        assert_eq!(header_lines, 5);
        assert_eq!(
            start_time,
            NaiveDate::from_ymd_opt(2024, 8, 7)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_header_without_count_marker() {
        let text = "EC-Lab ASCII FILE\nsomething else\n";
        let err = parse_header(text, Path::new("sample.mpt")).unwrap_err();
        assert!(matches!(err, CyclerError::MalformedHeader { .. }));
    }

    #[test]
    fn test_parse_header_without_start_time() {
        let text = "EC-Lab ASCII FILE\nNb header lines : 3\nTechnique : GCPL\n";
        let err = parse_header(text, Path::new("sample.mpt")).unwrap_err();
        assert!(matches!(err, CyclerError::MalformedHeader { .. }));
    }

    #[test]
    fn test_read_file_synthesizes_date() {
        let mut file = NamedTempFile::with_suffix(".mpt").unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let df = Biologic::new().read_file(file.path()).unwrap().collect().unwrap();
        assert_eq!(df.height(), 2);
        assert!(df.column("Date").is_ok());

        let start = NaiveDate::from_ymd_opt(2024, 8, 7)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let dates = df.column("Date").unwrap().datetime().unwrap();
        assert_eq!(dates.get(0), Some(start.and_utc().timestamp_micros()));
        assert_eq!(
            dates.get(1),
            Some(start.and_utc().timestamp_micros() + 1_500_000)
        );
    }

    #[test]
    fn test_step_correction_is_monotonic_across_files() {
        let df = df!(
            "Ns" => [0i64, 1, 0, 1, 1],
            SOURCE_FILE => [0i64, 0, 1, 1, 1],
        )
        .unwrap();

        let corrected = correct_multi_file_steps(df.lazy(), "Ns")
            .unwrap()
            .collect()
            .unwrap();
        let steps: Vec<i64> = corrected
            .column("Ns")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();

        // second file is offset by max(file 0) + 1 = 2
        assert_eq!(steps, vec![0, 1, 2, 3, 3]);
        for pair in steps.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }
}
