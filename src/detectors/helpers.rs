//! Common helper functions for chart pattern detection
//!
//! Thresholds and level arithmetic shared across detector modules.

use crate::TradeLevels;

// ============================================================
// THRESHOLDS
// ============================================================

/// Detectors fail closed below this many closes
pub const MIN_CLOSES: usize = 30;

/// Cup & Handle: stop sits this fraction of the full range below entry
pub const CUP_STOP_RANGE_FACTOR: f64 = 0.3;
/// Double Bottom: troughs are "equal" within this fraction of the series low
pub const DOUBLE_BOTTOM_TOLERANCE: f64 = 0.05;
/// Double Bottom: stop buffer below the lower trough, as a fraction of entry
pub const DOUBLE_BOTTOM_STOP_BUFFER: f64 = 0.03;
/// Double Bottom: indices compared as the two troughs
pub const DOUBLE_BOTTOM_FIRST_TROUGH: usize = 10;
pub const DOUBLE_BOTTOM_SECOND_TROUGH: usize = 20;
/// Geometric patterns target twice the risk
pub const REWARD_MULTIPLE: f64 = 2.0;

/// Placeholder stop: 3% below entry
pub const PLACEHOLDER_STOP_FACTOR: f64 = 0.97;
/// Placeholder target: 6% above entry
pub const PLACEHOLDER_TARGET_FACTOR: f64 = 1.06;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// (min, max) of a slice. None if empty.
#[inline]
pub fn extent(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Minimum of a slice. None if empty.
#[inline]
pub fn min_of(values: &[f64]) -> Option<f64> {
    extent(values).map(|(lo, _)| lo)
}

/// Entry at the last close, gated on the minimum length.
#[inline]
pub fn gated_entry(closes: &[f64], min_closes: usize) -> Option<f64> {
    if closes.len() < min_closes {
        return None;
    }
    closes.last().copied()
}

/// Long levels with the target at `multiple` times the risk above entry.
#[inline]
pub fn levels_with_multiple(entry: f64, stop_loss: f64, multiple: f64) -> Option<TradeLevels> {
    TradeLevels::long(entry, stop_loss, entry + multiple * (entry - stop_loss))
}
