//! Basytec format reader.
//!
//! Basytec exports are tab-separated `.txt` files with a variable-length
//! header of `~`-prefixed lines, the last of which is the column row. The
//! instrument logs only elapsed time plus a textual `Start of Test`
//! timestamp, so the absolute `Date` column is synthesized by offsetting
//! the start time with the elapsed seconds. Capacity is a single signed
//! cumulative `Ah[Ah]` column, so no counter synthesis is needed.

use chrono::NaiveDateTime;
use polars::prelude::*;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::error::{CyclerError, Result};
use crate::formats::{ColumnDictionary, CyclerFormat};
use crate::units::NamePattern;

const NAME_PATTERN: &str = r"^(.+)\[(.+)\]$";
const HEADER_PREFIX: char = '~';
const START_TIME_MARKER: &str = "Start of Test";
const ELAPSED_COLUMN: &str = "~Time[s]";

/// Reader for Basytec text exports.
pub struct Basytec {
    dictionary: ColumnDictionary,
    pattern: NamePattern,
}

impl Basytec {
    pub fn new() -> Self {
        Self {
            dictionary: ColumnDictionary::from_pairs(&[
                ("Date", "Date"),
                ("Time", "~Time[*]"),
                ("Step", "Line"),
                ("Current", "I[*]"),
                ("Voltage", "U[*]"),
                ("Capacity", "Ah[*]"),
                ("Temperature", "T1[*]"),
            ]),
            pattern: NamePattern::new(NAME_PATTERN).expect("built-in column name pattern is valid"),
        }
    }
}

impl Default for Basytec {
    fn default() -> Self {
        Self::new()
    }
}

impl CyclerFormat for Basytec {
    fn name(&self) -> &'static str {
        "basytec"
    }

    fn read_file(&self, path: &Path) -> Result<LazyFrame> {
        let raw = fs::read(path)?;
        let text = String::from_utf8_lossy(&raw);
        let (header_lines, start_time) = parse_header(&text, path)?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_skip_rows(header_lines - 1)
            .with_infer_schema_length(Some(0))
            .with_parse_options(CsvParseOptions::default().with_separator(b'\t'))
            .into_reader_with_file_handle(Cursor::new(text.as_bytes()))
            .finish()?;

        // elapsed time is non-negative; round half-up so the integer cast
        // does not truncate sub-second offsets
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
}

/// Count the `~`-prefixed header block and extract the test start
/// timestamp (`~Start of Test: 19.06.2023 17:56:53`).
fn parse_header(text: &str, path: &Path) -> Result<(usize, NaiveDateTime)> {
    let mut header_lines = 0;
    let mut start_time = None;
    for line in text.lines() {
        if !line.starts_with(HEADER_PREFIX) {
            break;
        }
        header_lines += 1;
        if line.contains(START_TIME_MARKER) {
            let value = line.splitn(2, ": ").nth(1).map(str::trim).ok_or_else(|| {
                CyclerError::malformed_header(path, format!("unparsable start line: {line}"))
            })?;
            let parsed = NaiveDateTime::parse_from_str(value, "%d.%m.%Y %H:%M:%S")
                .map_err(|e| {
                    CyclerError::malformed_header(
                        path,
                        format!("unparsable start timestamp '{value}': {e}"),
                    )
                })?;
            start_time = Some(parsed);
        }
    }

    if header_lines == 0 {
        return Err(CyclerError::malformed_header(
            path,
            "no '~'-prefixed header block found",
        ));
    }
    let start_time = start_time.ok_or_else(|| {
        CyclerError::malformed_header(path, format!("'{START_TIME_MARKER}' line missing"))
    })?;

    Ok((header_lines, start_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "~Results table\n\
~Start of Test: 19.06.2023 17:56:53\n\
~\n\
~Time[s]\tDataSet\tLine\tU[V]\tI[A]\tAh[Ah]\tT1[\u{b0}C]\n\
0.0\t1\t1\t3.532\t0.0\t0.0\t25.0\n\
1.002823\t1\t1\t3.533\t0.449\t0.000124\t25.4\n";

    #[test]
    fn test_parse_header() {
        let (header_lines, start_time) = parse_header(SAMPLE, Path::new("sample.txt")).unwrap();
        assert_eq!(header_lines, 4);
        assert_eq!(
            start_time,
            NaiveDate::from_ymd_opt(2023, 6, 19)
                .unwrap()
                .and_hms_opt(17, 56, 53)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_header_requires_start_time() {
        let text = "~Results table\n~Lines: 3\n0.0\t1\n";
        let err = parse_header(text, Path::new("sample.txt")).unwrap_err();
        assert!(matches!(err, CyclerError::MalformedHeader { .. }));
    }

    #[test]
    fn test_read_file_synthesizes_date_from_start_of_test() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let df = Basytec::new().read_file(file.path()).unwrap().collect().unwrap();
        assert_eq!(df.height(), 2);

        let start = NaiveDate::from_ymd_opt(2023, 6, 19)
            .unwrap()
            .and_hms_opt(17, 56, 53)
            .unwrap();
        let dates = df.column("Date").unwrap().datetime().unwrap();
        assert_eq!(dates.get(0), Some(start.and_utc().timestamp_micros()));
        // 1.002823 s after the start, to the microsecond
        assert_eq!(
            dates.get(1),
            Some(start.and_utc().timestamp_micros() + 1_002_823)
        );
    }
}
