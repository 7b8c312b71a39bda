//! Cycler Ingest Library
//!
//! A Rust library for normalizing heterogeneous battery cycler export
//! files into one canonical, lazily-evaluated Polars table.
//!
//! Battery cycler vendors disagree about everything: column names, unit
//! magnitudes, text encodings, header layouts, and how a single test gets
//! split across files. This library provides tools for:
//! - Resolving vendor column names and units against per-vendor patterns
//! - Deriving cycle/event counters and signed capacity from raw counters
//! - Discovering, ordering, and concatenating split multi-file procedures
//! - Reading vendor formats (Biologic, Biologic Modulo Bat, Neware,
//!   Basytec) with their encoding, header, and timestamp quirks
//! - Correcting step counters that reset in every split file
//! - Structured diagnostics for non-fatal per-file exclusions
//!
//! ## Usage
//!
//! ```no_run
//! use cycler_ingest::{Cycler, formats::BiologicMb};
//!
//! # fn example() -> cycler_ingest::Result<()> {
//! let format = BiologicMb::new();
//! let cycler = Cycler::load(&format, "data/procedure_*.mpt")?;
//! let table = cycler.collect()?;
//! println!("{} rows, {} excluded files", table.height(), cycler.diagnostics().len());
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod diagnostics;
pub mod error;
pub mod expressions;
pub mod formats;
pub mod pipeline;
pub mod schema;
pub mod units;

// Re-export commonly used types
pub use diagnostics::{Diagnostic, Diagnostics};
pub use error::{CyclerError, Result};
pub use formats::{Basytec, Biologic, BiologicMb, ColumnDictionary, CyclerFormat, Neware};
pub use pipeline::Cycler;
pub use units::{NamePattern, Quantity, UnitConverter};
