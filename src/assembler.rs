//! Multi-file discovery, ordering, and concatenation.
//!
//! A single logical test procedure is frequently split across several
//! export files (`name.mpt`, `name_1.mpt`, `name_2.mpt`, ...). Filesystem
//! listing order is unspecified, so the assembler recovers the intended
//! sequence from the integer index embedded in each filename, reads every
//! file through the vendor format, drops files that fail the
//! column-consistency check, and vertically concatenates the survivors.

use glob::glob;
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{CyclerError, Result};
use crate::formats::CyclerFormat;
use crate::schema::SOURCE_FILE;

/// The concatenated raw table for one file set, plus everything the
/// derivation stage needs to know about it.
pub struct Assembly {
    /// Vertically concatenated raw table, tagged with [`SOURCE_FILE`].
    pub frame: LazyFrame,
    /// Column names in file-native order (first surviving file).
    pub columns: Vec<String>,
    /// Schema of the surviving files.
    pub schema: SchemaRef,
    /// Non-fatal events recorded while assembling.
    pub diagnostics: Diagnostics,
    /// Surviving files in concatenation order.
    pub files: Vec<PathBuf>,
}

impl std::fmt::Debug for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembly")
            .field("frame", &"<LazyFrame>")
            .field("columns", &self.columns)
            .field("schema", &self.schema)
            .field("diagnostics", &self.diagnostics)
            .field("files", &self.files)
            .finish()
    }
}

/// Discovers, orders, and concatenates the raw files of one procedure.
#[derive(Debug, Clone)]
pub struct FileSetAssembler {
    input_data_path: String,
    common_suffix: String,
}

impl FileSetAssembler {
    pub fn new(input_data_path: &str, common_suffix: &str) -> Self {
        Self {
            input_data_path: input_data_path.to_string(),
            common_suffix: common_suffix.to_string(),
        }
    }

    /// Resolve the glob and return the file list in deterministic order.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let entries = glob(&self.input_data_path).map_err(|e| CyclerError::InvalidPattern {
            pattern: self.input_data_path.clone(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CyclerError::Io(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(CyclerError::NoFilesFound {
                pattern: self.input_data_path.clone(),
            });
        }

        Ok(self.sort_files(files))
    }

    /// Read, check, tag, and concatenate the file set.
    pub fn assemble(&self, format: &dyn CyclerFormat) -> Result<Assembly> {
        let files = self.discover()?;
        debug!(
            "Assembling {} file(s) for format '{}' from {}",
            files.len(),
            format.name(),
            self.input_data_path
        );

        // Reads may run in parallel as an optimization, but results are
        // reassembled into sorted-file order here, and every read runs to
        // completion before the first failure propagates.
        let read_results: Vec<Result<(LazyFrame, SchemaRef)>> = files
            .par_iter()
            .map(|path| {
                let mut frame = format.read_file(path)?;
                let schema = frame.collect_schema()?;
                Ok((frame, schema))
            })
            .collect();

        let mut frames = Vec::with_capacity(files.len());
        for result in read_results {
            frames.push(result?);
        }

        let union: BTreeSet<String> = frames
            .iter()
            .flat_map(|(_, schema)| schema.iter_names().map(|name| name.to_string()))
            .collect();

        let mut diagnostics = Diagnostics::default();
        let mut surviving = Vec::with_capacity(frames.len());
        let mut surviving_files = Vec::with_capacity(files.len());
        for (path, (frame, schema)) in files.iter().zip(frames) {
            if schema.len() < union.len() {
                warn!(
                    "File {} has missing columns, it has not been read",
                    path.display()
                );
                diagnostics.push(Diagnostic::FileExcluded {
                    path: path.clone(),
                    columns_found: schema.len(),
                    columns_expected: union.len(),
                });
                continue;
            }
            surviving.push((frame, schema));
            surviving_files.push(path.clone());
        }

        if surviving.is_empty() {
            return Err(CyclerError::InconsistentFileSchema {
                pattern: self.input_data_path.clone(),
            });
        }

        let first_schema = surviving[0].1.clone();
        let columns: Vec<String> = first_schema
            .iter_names()
            .map(|name| name.to_string())
            .collect();

        let tagged: Vec<LazyFrame> = surviving
            .into_iter()
            .enumerate()
            .map(|(index, (frame, _))| {
                frame.with_column(lit(index as i64).cast(DataType::Int64).alias(SOURCE_FILE))
            })
            .collect();
        let frame = concat(tagged, UnionArgs::default())?;

        Ok(Assembly {
            frame,
            columns,
            schema: first_schema,
            diagnostics,
            files: surviving_files,
        })
    }

    /// Sort files ascending by the integer index embedded in their names.
    fn sort_files(&self, mut files: Vec<PathBuf>) -> Vec<PathBuf> {
        let names: Vec<String> = files
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect();
        let prefix = longest_common_prefix(&names);
        files.sort_by_key(|path| self.file_index(&path.to_string_lossy(), &prefix));
        files
    }

    /// Extract the split-file index: strip the common prefix, truncate at
    /// the first occurrence of the common suffix marker, then parse the
    /// first run of decimal digits. Files with no digits sort as index 0.
    fn file_index(&self, path: &str, common_prefix: &str) -> u64 {
        let mut remainder = path.strip_prefix(common_prefix).unwrap_or(path);
        if !self.common_suffix.is_empty() {
            if let Some(at) = remainder.find(&self.common_suffix) {
                remainder = &remainder[..at];
            }
        }
        first_integer(remainder)
    }
}

/// Longest common literal prefix across all names.
fn longest_common_prefix(names: &[String]) -> String {
    let Some(first) = names.first() else {
        return String::new();
    };
    let mut prefix: &str = first;
    for name in &names[1..] {
        let mut end = 0;
        for ((at, a), b) in prefix.char_indices().zip(name.chars()) {
            if a != b {
                break;
            }
            end = at + a.len_utf8();
        }
        prefix = &prefix[..end];
    }
    prefix.to_string()
}

/// First run of decimal digits parsed as an integer, or 0 when absent.
fn first_integer(text: &str) -> u64 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::ColumnDictionary;
    use crate::units::NamePattern;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Minimal plain-CSV format used to exercise assembly mechanics.
    struct PlainCsv {
        dictionary: ColumnDictionary,
        pattern: NamePattern,
    }

    impl PlainCsv {
        fn new() -> Self {
            Self {
                dictionary: ColumnDictionary::from_pairs(&[("Current", "I(*)")]),
                pattern: NamePattern::new(r"^(.+)\((.+)\)$").unwrap(),
            }
        }
    }

    impl CyclerFormat for PlainCsv {
        fn name(&self) -> &'static str {
            "plain-csv"
        }

        fn read_file(&self, path: &Path) -> Result<LazyFrame> {
            let df = CsvReadOptions::default()
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()?;
            Ok(df.lazy())
        }

        fn column_dictionary(&self) -> &ColumnDictionary {
            &self.dictionary
        }

        fn name_pattern(&self) -> &NamePattern {
            &self.pattern
        }

        fn common_suffix(&self) -> &str {
            ".csv"
        }
    }

    fn assembler_for(dir: &TempDir) -> FileSetAssembler {
        let pattern = dir.path().join("f*.csv");
        FileSetAssembler::new(&pattern.to_string_lossy(), ".csv")
    }

    #[test]
    fn test_sort_recovers_split_file_order() {
        let assembler = FileSetAssembler::new("unused", ".csv");
        let files = vec![
            PathBuf::from("f_2.csv"),
            PathBuf::from("f.csv"),
            PathBuf::from("f_1.csv"),
        ];
        let sorted = assembler.sort_files(files);
        assert_eq!(
            sorted,
            vec![
                PathBuf::from("f.csv"),
                PathBuf::from("f_1.csv"),
                PathBuf::from("f_2.csv"),
            ]
        );
    }

    #[test]
    fn test_file_index_truncates_at_suffix_marker() {
        let assembler = FileSetAssembler::new("unused", "_MB");
        // digits after the marker must not influence ordering
        assert_eq!(assembler.file_index("proc_02_MB_CA1.mpt", "proc_0"), 2);
        assert_eq!(assembler.file_index("proc_11_MB_CA9.mpt", "proc_"), 11);
    }

    #[test]
    fn test_file_index_without_digits_is_zero() {
        let assembler = FileSetAssembler::new("unused", ".csv");
        assert_eq!(assembler.file_index("f.csv", "f"), 0);
    }

    #[test]
    fn test_longest_common_prefix() {
        let names = vec![
            "run_2.csv".to_string(),
            "run.csv".to_string(),
            "run_1.csv".to_string(),
        ];
        assert_eq!(longest_common_prefix(&names), "run");
        assert_eq!(longest_common_prefix(&[]), "");
    }

    #[test]
    fn test_discover_errors_when_nothing_matches() {
        let dir = TempDir::new().unwrap();
        let assembler = assembler_for(&dir);
        let err = assembler.discover().unwrap_err();
        assert!(matches!(err, CyclerError::NoFilesFound { .. }));
    }

    #[test]
    fn test_discover_is_independent_of_creation_order() {
        let dir = TempDir::new().unwrap();
        for name in ["f_2.csv", "f.csv", "f_1.csv"] {
            fs::write(dir.path().join(name), "I(A)\n1.0\n").unwrap();
        }
        let assembler = assembler_for(&dir);
        let files = assembler.discover().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["f.csv", "f_1.csv", "f_2.csv"]);
    }

    #[test]
    fn test_assemble_excludes_files_with_missing_columns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.csv"), "I(A),E(V)\n1.0,3.0\n").unwrap();
        fs::write(dir.path().join("f_1.csv"), "I(A),E(V)\n2.0,4.0\n").unwrap();
        // partial export: voltage column missing
        fs::write(dir.path().join("f_2.csv"), "I(A)\n9.0\n").unwrap();

        let assembler = assembler_for(&dir);
        let assembly = assembler.assemble(&PlainCsv::new()).unwrap();

        assert_eq!(assembly.diagnostics.len(), 1);
        assert_eq!(
            assembly.diagnostics.excluded_files(),
            vec![dir.path().join("f_2.csv").as_path()]
        );
        assert_eq!(assembly.files.len(), 2);

        let df = assembly.frame.collect().unwrap();
        assert_eq!(df.height(), 2);
        let tags: Vec<i64> = df
            .column(SOURCE_FILE)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(tags, vec![0, 1]);
        let current: Vec<f64> = df
            .column("I(A)")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(current, vec![1.0, 2.0]);
    }

    #[test]
    fn test_assemble_fails_when_every_file_is_excluded() {
        let dir = TempDir::new().unwrap();
        // disjoint extras: each file is below the two-file union
        fs::write(dir.path().join("f.csv"), "I(A)\n1.0\n").unwrap();
        fs::write(dir.path().join("f_1.csv"), "E(V)\n3.0\n").unwrap();

        let assembler = assembler_for(&dir);
        let err = assembler.assemble(&PlainCsv::new()).unwrap_err();
        assert!(matches!(err, CyclerError::InconsistentFileSchema { .. }));
    }
}
