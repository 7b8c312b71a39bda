//! Column-name and unit resolution for vendor export files.
//!
//! Cycler vendors name the same physical channel in incompatible ways
//! (`I/mA`, `Current(mA)`, `I[A]`) and drift between unit magnitudes across
//! firmware versions. This module parses a candidate column name against a
//! vendor's [`NamePattern`], resolves the unit token into an exact
//! power-of-ten scale factor, and produces the Polars expressions that
//! normalize the column to its default unit (A, V, Ah, s, °C).

use polars::prelude::*;
use regex::Regex;

use crate::error::{CyclerError, Result};
use crate::schema;

/// Physical quantities recognized in the canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Time,
    Current,
    Voltage,
    Capacity,
    ChargeCapacity,
    DischargeCapacity,
    Temperature,
}

impl Quantity {
    /// Key under which a vendor's column dictionary names this quantity.
    pub fn dictionary_key(&self) -> &'static str {
        match self {
            Quantity::Time => "Time",
            Quantity::Current => "Current",
            Quantity::Voltage => "Voltage",
            Quantity::Capacity => "Capacity",
            Quantity::ChargeCapacity => "Charge Capacity",
            Quantity::DischargeCapacity => "Discharge Capacity",
            Quantity::Temperature => "Temperature",
        }
    }

    /// The default unit this quantity is normalized to.
    pub fn base_unit(&self) -> &'static str {
        match self {
            Quantity::Time => "s",
            Quantity::Current => "A",
            Quantity::Voltage => "V",
            Quantity::Capacity | Quantity::ChargeCapacity | Quantity::DischargeCapacity => "Ah",
            Quantity::Temperature => "C",
        }
    }

    /// Canonical output column name for this quantity in its default unit.
    pub fn default_column(&self) -> &'static str {
        match self {
            Quantity::Time => schema::TIME,
            Quantity::Current => schema::CURRENT,
            Quantity::Voltage => schema::VOLTAGE,
            Quantity::Capacity => schema::CAPACITY,
            Quantity::ChargeCapacity => "Charge Capacity [Ah]",
            Quantity::DischargeCapacity => "Discharge Capacity [Ah]",
            Quantity::Temperature => schema::TEMPERATURE,
        }
    }
}

/// SI magnitude prefix of a unit token. Every supported prefix is an exact
/// power of ten relative to the quantity's default unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Nano,
    Micro,
    Milli,
    None,
    Kilo,
    Mega,
}

impl Prefix {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "n" => Some(Prefix::Nano),
            "µ" | "u" => Some(Prefix::Micro),
            "m" => Some(Prefix::Milli),
            "" => Some(Prefix::None),
            "k" => Some(Prefix::Kilo),
            "M" => Some(Prefix::Mega),
            _ => None,
        }
    }

    /// Scale factor from a prefixed unit to the unprefixed default unit.
    pub fn factor(&self) -> f64 {
        match self {
            Prefix::Nano => 1e-9,
            Prefix::Micro => 1e-6,
            Prefix::Milli => 1e-3,
            Prefix::None => 1.0,
            Prefix::Kilo => 1e3,
            Prefix::Mega => 1e6,
        }
    }
}

/// Compiled vendor column-name pattern with a quantity slot and a unit slot.
///
/// The pattern is a regular expression with exactly two capture groups, e.g.
/// `^(.+)/(.+)$` for Biologic's `I/mA` style or `^(.+)\((.+)\)$` for
/// Neware's `Current(mA)` style. Templated dictionary entries put a literal
/// `*` in the unit slot (`"I/*"`).
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| CyclerError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() != 3 {
            return Err(CyclerError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "expected exactly two capture groups (quantity, unit)".to_string(),
            });
        }
        Ok(Self { regex })
    }

    /// Split a column name into its (quantity token, unit token) pair, or
    /// `None` if the name does not have this vendor's shape.
    pub fn extract<'a>(&self, column: &'a str) -> Option<(&'a str, &'a str)> {
        let captures = self.regex.captures(column)?;
        match (captures.get(1), captures.get(2)) {
            (Some(quantity), Some(unit)) => Some((quantity.as_str(), unit.as_str())),
            _ => None,
        }
    }
}

/// Split a unit token such as `mA`, `mA.h` or `°C` into prefix and base unit.
///
/// Spellings are normalized before splitting: the dot in `A.h` is dropped
/// and the degree sign variants collapse onto `C`.
fn split_unit(token: &str) -> Option<(Prefix, &'static str)> {
    let normalized = token.trim().replace('.', "").replace('℃', "C").replace('°', "");
    // Longest base first so `mAh` strips `Ah`, not `A`
    const BASES: &[&str] = &["Ah", "A", "V", "s", "C"];
    for base in BASES {
        if let Some(prefix_token) = normalized.strip_suffix(base) {
            if let Some(prefix) = Prefix::from_token(prefix_token) {
                return Some((prefix, base));
            }
        }
    }
    None
}

/// A resolved vendor column: its literal name, the quantity it measures,
/// and the magnitude prefix of its native unit.
#[derive(Debug, Clone)]
pub struct UnitConverter {
    column_name: String,
    quantity: Quantity,
    prefix: Prefix,
}

impl UnitConverter {
    /// Resolve a column whose unit token is already known.
    pub fn resolve(column_name: &str, unit_token: &str, quantity: Quantity) -> Result<Self> {
        let (prefix, base) = split_unit(unit_token).ok_or_else(|| CyclerError::UnrecognizedColumn {
            column: column_name.to_string(),
            reason: format!("unknown unit token '{unit_token}'"),
        })?;
        if base != quantity.base_unit() {
            return Err(CyclerError::UnrecognizedColumn {
                column: column_name.to_string(),
                reason: format!(
                    "unit '{unit_token}' does not measure {}",
                    quantity.dictionary_key()
                ),
            });
        }
        Ok(Self {
            column_name: column_name.to_string(),
            quantity,
            prefix,
        })
    }

    /// Scan column names in their stable, file-native order for the quantity
    /// named by a templated dictionary entry. The first match wins.
    pub fn search_columns(
        columns: &[String],
        template: &str,
        pattern: &NamePattern,
        quantity: Quantity,
    ) -> Result<Self> {
        let Some((wanted, _)) = pattern.extract(template) else {
            return Err(CyclerError::UnrecognizedColumn {
                column: template.to_string(),
                reason: "dictionary entry does not match the column name pattern".to_string(),
            });
        };
        for column in columns {
            let Some((token, unit)) = pattern.extract(column) else {
                continue;
            };
            if token == wanted {
                return Self::resolve(column, unit, quantity);
            }
        }
        Err(CyclerError::QuantityNotFound {
            quantity: quantity.dictionary_key().to_string(),
        })
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Expression converting the column to its default unit under the
    /// canonical output name.
    pub fn to_default(&self) -> Expr {
        self.scaled().alias(self.quantity.default_column())
    }

    /// Like [`to_default`](Self::to_default) but preserving the vendor
    /// column name. Used when related columns (charge and discharge
    /// capacity counters) must stay distinguishable before combination.
    pub fn to_default_keep_name(&self) -> Expr {
        self.scaled().alias(self.column_name.as_str())
    }

    /// Inverse of [`to_default`](Self::to_default): reads the canonical
    /// column and restores the native unit under the vendor name.
    pub fn from_default(&self) -> Expr {
        (col(self.quantity.default_column()) / lit(self.prefix.factor()))
            .alias(self.column_name.as_str())
    }

    fn scaled(&self) -> Expr {
        col(self.column_name.as_str()).cast(DataType::Float64) * lit(self.prefix.factor())
    }
}
