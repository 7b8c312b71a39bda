//! Derived-column expressions for the canonical table.
//!
//! Pure builders over column names: nothing here touches data until the
//! surrounding lazy frame is collected.

use polars::prelude::*;

use crate::schema;

/// Cycle counter derived from the step sequence.
///
/// A cycle boundary is any *decrease* in the step counter (the
/// charge/discharge/rest loop restarting). The first row has no
/// predecessor and counts as "no change", so the counter starts at 0.
pub fn cycle(step_column: &str) -> Expr {
    step_delta(step_column)
        .lt(lit(0))
        .fill_null(lit(false))
        .cast(DataType::Int64)
        .cum_sum(false)
        .alias(schema::CYCLE)
}

/// Event counter derived from the step sequence.
///
/// An event boundary is *any* change in the step counter, increase or
/// decrease. Finer-grained than cycles; segments contiguous constant-step
/// blocks. Starts at 0 like the cycle counter.
pub fn event(step_column: &str) -> Expr {
    step_delta(step_column)
        .neq(lit(0))
        .fill_null(lit(false))
        .cast(DataType::Int64)
        .cum_sum(false)
        .alias(schema::EVENT)
}

fn step_delta(step_column: &str) -> Expr {
    let step = col(step_column).cast(DataType::Int64);
    step.clone() - step.shift(lit(1))
}

/// Signed cumulative capacity reconstructed from separate monotonic charge
/// and discharge counters.
///
/// Counter resets show up as negative sample-to-sample diffs and are
/// clipped to zero rather than propagated: resets are expected hardware
/// behavior, not faults. The cumulative sum of the signed diffs is anchored
/// by `max(charge)` so the series never goes negative when the log starts
/// mid-charge.
pub fn capacity_from_counters(charge_column: &str, discharge_column: &str) -> Expr {
    let charged = monotonic_diff(charge_column);
    let discharged = monotonic_diff(discharge_column);
    ((charged - discharged).cum_sum(false) + col(charge_column).max())
        .alias(schema::CAPACITY)
}

/// Per-sample increment of a monotonic counter, clipped at zero. The first
/// sample has no predecessor and contributes zero.
fn monotonic_diff(column: &str) -> Expr {
    let delta = col(column) - col(column).shift(lit(1));
    when(delta.clone().gt(lit(0.0)).fill_null(lit(false)))
        .then(delta)
        .otherwise(lit(0.0))
}
