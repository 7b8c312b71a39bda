//! Normalization pipeline root.
//!
//! Composes the assembler, a vendor format, and the derivation expressions
//! into the canonical lazy table. The expression graph is built exactly
//! once at load time; nothing is materialized until the caller collects.

use polars::prelude::*;
use tracing::debug;

use crate::assembler::FileSetAssembler;
use crate::diagnostics::Diagnostics;
use crate::error::{CyclerError, Result};
use crate::expressions;
use crate::formats::{ColumnDictionary, CyclerFormat};
use crate::schema;
use crate::units::{NamePattern, Quantity, UnitConverter};

/// A loaded procedure: the canonical lazy table plus the diagnostics
/// collected while assembling it.
pub struct Cycler {
    frame: LazyFrame,
    diagnostics: Diagnostics,
}

impl std::fmt::Debug for Cycler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cycler")
            .field("frame", &"<LazyFrame>")
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl Cycler {
    /// Discover, read, and normalize every file matching `input_data_path`.
    ///
    /// Structural problems (no matching files, malformed headers, a missing
    /// required quantity) fail here; there is no partial canonical table.
    /// Per-file schema mismatches are recovered by exclusion and reported
    /// through [`diagnostics`](Self::diagnostics).
    pub fn load(format: &dyn CyclerFormat, input_data_path: &str) -> Result<Self> {
        let assembler = FileSetAssembler::new(input_data_path, format.common_suffix());
        let assembly = assembler.assemble(format)?;
        debug!(
            "Normalizing {} file(s) read as '{}'",
            assembly.files.len(),
            format.name()
        );

        let corrected = format.post_concat_correction(assembly.frame)?;
        let frame = canonical_frame(corrected, format, &assembly.columns, &assembly.schema)?;

        Ok(Self {
            frame,
            diagnostics: assembly.diagnostics,
        })
    }

    /// The canonical lazy table. Cloning a lazy frame is cheap; callers can
    /// inspect or extend the plan freely.
    pub fn frame(&self) -> LazyFrame {
        self.frame.clone()
    }

    /// Materialize the canonical table.
    pub fn collect(&self) -> Result<DataFrame> {
        Ok(self.frame.clone().collect()?)
    }

    /// Non-fatal events recorded during assembly (excluded files).
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// Build the canonical selection over the corrected raw table.
fn canonical_frame(
    frame: LazyFrame,
    format: &dyn CyclerFormat,
    columns: &[String],
    raw_schema: &Schema,
) -> Result<LazyFrame> {
    let dictionary = format.column_dictionary();
    let pattern = format.name_pattern();

    let step_column = required_entry(dictionary, "Step")?;
    let step = (col(step_column).cast(DataType::Int64) + lit(format.step_adjustment()))
        .alias(schema::STEP);

    let current = resolve(columns, dictionary, pattern, Quantity::Current)?.to_default();
    let voltage = resolve(columns, dictionary, pattern, Quantity::Voltage)?.to_default();

    // Direct capacity column when the vendor logs one, reconstruction from
    // charge/discharge counters otherwise. The counters are first scaled in
    // place under their vendor names so they stay distinguishable.
    let (counter_columns, capacity) = if dictionary.contains(Quantity::Capacity.dictionary_key()) {
        let converter = resolve(columns, dictionary, pattern, Quantity::Capacity)?;
        (Vec::new(), converter.to_default())
    } else {
        let charge = resolve(columns, dictionary, pattern, Quantity::ChargeCapacity)?;
        let discharge = resolve(columns, dictionary, pattern, Quantity::DischargeCapacity)?;
        let synthesized =
            expressions::capacity_from_counters(charge.column_name(), discharge.column_name());
        (
            vec![charge.to_default_keep_name(), discharge.to_default_keep_name()],
            synthesized,
        )
    };

    let temperature = temperature_expr(columns, dictionary, pattern)?;

    let mut selection = vec![
        date_expr(dictionary, raw_schema)?,
        time_expr(columns, dictionary, pattern)?,
        step,
        expressions::cycle(step_column),
        expressions::event(step_column),
        current,
        voltage,
        capacity,
    ];
    if let Some(expr) = temperature {
        selection.push(expr);
    }

    let frame = if counter_columns.is_empty() {
        frame
    } else {
        frame.with_columns(counter_columns)
    };
    Ok(frame.select(selection))
}

/// The date column passes through when the reader already produced a
/// datetime and is cast otherwise.
fn date_expr(dictionary: &ColumnDictionary, raw_schema: &Schema) -> Result<Expr> {
    let name = required_entry(dictionary, "Date")?;
    let expr = match raw_schema.get(name) {
        Some(DataType::Datetime(_, _)) => col(name),
        _ => col(name).cast(DataType::Datetime(TimeUnit::Microseconds, None)),
    };
    Ok(expr.alias(schema::DATE))
}

/// Elapsed time resolves through the unit machinery when the dictionary
/// entry is templated, and is a plain cast when it names a literal column.
fn time_expr(
    columns: &[String],
    dictionary: &ColumnDictionary,
    pattern: &NamePattern,
) -> Result<Expr> {
    let template = required_entry(dictionary, Quantity::Time.dictionary_key())?;
    if pattern.extract(template).is_some() {
        Ok(UnitConverter::search_columns(columns, template, pattern, Quantity::Time)?.to_default())
    } else {
        Ok(col(template).cast(DataType::Float64).alias(schema::TIME))
    }
}

/// Temperature is optional: not every test bench has the channel wired, so
/// an unmatched dictionary entry omits the column instead of failing.
fn temperature_expr(
    columns: &[String],
    dictionary: &ColumnDictionary,
    pattern: &NamePattern,
) -> Result<Option<Expr>> {
    let Some(template) = dictionary.get(Quantity::Temperature.dictionary_key()) else {
        return Ok(None);
    };
    match UnitConverter::search_columns(columns, template, pattern, Quantity::Temperature) {
        Ok(converter) => Ok(Some(converter.to_default())),
        Err(CyclerError::QuantityNotFound { .. }) => {
            debug!("No temperature column found, omitting it");
            Ok(None)
        }
        Err(other) => Err(other),
    }
}

fn resolve(
    columns: &[String],
    dictionary: &ColumnDictionary,
    pattern: &NamePattern,
    quantity: Quantity,
) -> Result<UnitConverter> {
    let template = required_entry(dictionary, quantity.dictionary_key())?;
    UnitConverter::search_columns(columns, template, pattern, quantity)
}

fn required_entry<'a>(dictionary: &'a ColumnDictionary, key: &str) -> Result<&'a str> {
    dictionary.get(key).ok_or_else(|| CyclerError::QuantityNotFound {
        quantity: key.to_string(),
    })
}
