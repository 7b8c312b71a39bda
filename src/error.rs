//! Error handling for cycler ingestion operations.
//!
//! Provides error types with context for file discovery, header parsing,
//! column/unit resolution, and table assembly failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CyclerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Invalid input pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("No files match input pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("Every file matching '{pattern}' was excluded by the column consistency check")]
    InconsistentFileSchema { pattern: String },

    #[error("Quantity '{quantity}' not found in any column of the imported data")]
    QuantityNotFound { quantity: String },

    #[error("Column '{column}' could not be resolved: {reason}")]
    UnrecognizedColumn { column: String, reason: String },

    #[error("Malformed header in file: {path} - {reason}")]
    MalformedHeader { path: PathBuf, reason: String },

    #[error("Spreadsheet error in file: {path} - {reason}")]
    Spreadsheet { path: PathBuf, reason: String },
}

impl CyclerError {
    /// Create a malformed header error with context.
    pub fn malformed_header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a spreadsheet error with context.
    pub fn spreadsheet(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Spreadsheet {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CyclerError>;
