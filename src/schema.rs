//! Canonical output schema for normalized cycler data.
//!
//! Every format reader, whatever its native column names and units, is
//! normalized to this fixed column set and order. Downstream filtering and
//! analysis code depends on these names being identical across vendors.

/// Absolute timestamp of each sample.
pub const DATE: &str = "Date";

/// Elapsed test time in seconds, monotonic non-decreasing within a file.
pub const TIME: &str = "Time [s]";

/// Instrument step counter, 1-based after per-vendor adjustment.
pub const STEP: &str = "Step";

/// Derived cycle counter; increments on any decrease in the step counter.
pub const CYCLE: &str = "Cycle";

/// Derived event counter; increments on any change in the step counter.
pub const EVENT: &str = "Event";

/// Signed current in amperes.
pub const CURRENT: &str = "Current [A]";

/// Cell voltage in volts.
pub const VOLTAGE: &str = "Voltage [V]";

/// Signed cumulative capacity in ampere-hours.
pub const CAPACITY: &str = "Capacity [Ah]";

/// Cell or chamber temperature in degrees Celsius. Optional: not every test
/// bench has a temperature channel wired.
pub const TEMPERATURE: &str = "Temperature [C]";

/// Transient per-row tag identifying which source file a row came from
/// (0-based in read order). Used for cross-file counter correction and
/// dropped from the canonical output.
pub const SOURCE_FILE: &str = "Source File";

/// The canonical column order. Temperature is appended last when present.
pub fn canonical_columns(include_temperature: bool) -> Vec<&'static str> {
    let mut columns = vec![
        DATE, TIME, STEP, CYCLE, EVENT, CURRENT, VOLTAGE, CAPACITY,
    ];
    if include_temperature {
        columns.push(TEMPERATURE);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_column_order() {
        let columns = canonical_columns(false);
        assert_eq!(
            columns,
            vec![
                "Date",
                "Time [s]",
                "Step",
                "Cycle",
                "Event",
                "Current [A]",
                "Voltage [V]",
                "Capacity [Ah]",
            ]
        );
    }

    #[test]
    fn test_temperature_is_appended_last() {
        let columns = canonical_columns(true);
        assert_eq!(columns.last(), Some(&TEMPERATURE));
        assert_eq!(columns.len(), 9);
    }
}
