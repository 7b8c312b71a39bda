//! Structured diagnostics for non-fatal ingestion events.
//!
//! Per-file exclusions are recoverable: the file is dropped and processing
//! continues with the rest of the set. Rather than leaking these through a
//! global warning channel, they are collected here and returned alongside
//! the result so callers (and tests) can assert on them deterministically.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// A single non-fatal event recorded during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Diagnostic {
    /// A file in a multi-file set had fewer columns than the union across
    /// the set (partial or corrupted export) and was excluded.
    FileExcluded {
        path: PathBuf,
        columns_found: usize,
        columns_expected: usize,
    },
}

/// Ordered collection of diagnostics from one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Paths of files excluded by the schema-consistency check, in
    /// exclusion order.
    pub fn excluded_files(&self) -> Vec<&Path> {
        self.entries
            .iter()
            .map(|entry| match entry {
                Diagnostic::FileExcluded { path, .. } => path.as_path(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_files_preserves_order() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Diagnostic::FileExcluded {
            path: PathBuf::from("b.csv"),
            columns_found: 3,
            columns_expected: 4,
        });
        diagnostics.push(Diagnostic::FileExcluded {
            path: PathBuf::from("a.csv"),
            columns_found: 2,
            columns_expected: 4,
        });

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics.excluded_files(),
            vec![Path::new("b.csv"), Path::new("a.csv")]
        );
    }
}
