//! Vendor format readers for battery cycler export files.
//!
//! Every vendor is described by a [`CyclerFormat`] implementation: a file
//! reader plus the column dictionary, name pattern, and quirk hooks the
//! normalization pipeline composes over. Vendors are capabilities, not
//! subclasses: adding an instrument means implementing the trait, and
//! callers outside this crate can plug in their own formats the same way.
//!
//! ## Vendors
//!
//! - [`biologic`] - Biologic `.mpt` tab-separated text exports, including
//!   the Modulo Bat multi-file variant with cross-file step correction
//! - [`neware`] - Neware `.xlsx` workbook exports
//! - [`basytec`] - Basytec `.txt` tab-separated text exports

pub mod basytec;
pub mod biologic;
pub mod neware;

pub use basytec::Basytec;
pub use biologic::{Biologic, BiologicMb};
pub use neware::Neware;

use polars::prelude::LazyFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::units::NamePattern;

/// Mapping from canonical quantity name (`"Current"`, `"Voltage"`,
/// `"Charge Capacity"`, ...) to the vendor's literal or templated column
/// name (`"Ns"`, `"I/*"`). Supplied once per vendor, immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnDictionary {
    entries: HashMap<String, String>,
}

impl ColumnDictionary {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Capability interface for one cycler vendor.
///
/// `read_file` turns a single on-disk export into a raw lazy frame with
/// vendor-native columns; the remaining methods tell the pipeline how to
/// interpret those columns. The two hooks cover known vendor quirks:
/// `step_adjustment` for off-by-one step counters and
/// `post_concat_correction` for counters that reset per split file.
pub trait CyclerFormat: Send + Sync {
    /// Short vendor name used in log messages.
    fn name(&self) -> &'static str;

    /// Read one raw file. Row order must match on-disk order.
    fn read_file(&self, path: &Path) -> Result<LazyFrame>;

    fn column_dictionary(&self) -> &ColumnDictionary;

    fn name_pattern(&self) -> &NamePattern;

    /// Filename marker separating the split-file index from the rest of the
    /// name, for procedures split across several files.
    fn common_suffix(&self) -> &str {
        ""
    }

    /// Offset added to the raw step counter so the first step is index 1.
    fn step_adjustment(&self) -> i64 {
        0
    }

    /// Post-processing applied to the concatenated multi-file table, before
    /// any derivation. The default is a no-op.
    fn post_concat_correction(&self, frame: LazyFrame) -> Result<LazyFrame> {
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_dictionary_lookup() {
        let dictionary = ColumnDictionary::from_pairs(&[("Current", "I/*"), ("Step", "Ns")]);
        assert_eq!(dictionary.get("Current"), Some("I/*"));
        assert_eq!(dictionary.get("Step"), Some("Ns"));
        assert_eq!(dictionary.get("Voltage"), None);
        assert!(dictionary.contains("Step"));
        assert!(!dictionary.contains("Capacity"));
    }
}
