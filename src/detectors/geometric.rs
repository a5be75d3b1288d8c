//! Geometric chart pattern detectors
//!
//! Patterns with an actual shape test: Cup & Handle, Double Bottom.

use super::helpers::{
    self, extent, gated_entry, levels_with_multiple, min_of, MIN_CLOSES,
};
use crate::{DetectorKind, PatternDetector, PatternId, PatternResult, Result, ScreenError, TradeLevels};

impl_with_defaults!(CupAndHandleDetector, DoubleBottomDetector);

fn check_factor(value: f64, name: &'static str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ScreenError::InvalidConfig(format!(
            "{name} must be finite and > 0, got {value}"
        )));
    }
    Ok(())
}

// ============================================================
// CUP & HANDLE
// ============================================================

/// Cup & Handle - dip below the midpoint in the first half, hold above it in the second.
///
/// `midpoint = (max + min) / 2` over the whole series, halves split at `len / 2`.
/// Entry is the last close, stop sits `stop_range_factor * (max - min)` below it.
#[derive(Debug, Clone, Copy)]
pub struct CupAndHandleDetector {
    pub stop_range_factor: f64,
    pub reward_multiple: f64,
}

impl Default for CupAndHandleDetector {
    fn default() -> Self {
        Self {
            stop_range_factor: helpers::CUP_STOP_RANGE_FACTOR,
            reward_multiple: helpers::REWARD_MULTIPLE,
        }
    }
}

impl CupAndHandleDetector {
    fn levels(&self, closes: &[f64]) -> Option<TradeLevels> {
        let entry = gated_entry(closes, MIN_CLOSES)?;
        let (lo, hi) = extent(closes)?;
        let midpoint = (hi + lo) / 2.0;

        let half = closes.len() / 2;
        let cup_low = min_of(&closes[..half])?;
        let handle_low = min_of(&closes[half..])?;

        if cup_low >= midpoint || handle_low <= midpoint {
            return None;
        }

        let stop_loss = entry - self.stop_range_factor * (hi - lo);
        levels_with_multiple(entry, stop_loss, self.reward_multiple)
    }
}

impl PatternDetector for CupAndHandleDetector {
    fn id(&self) -> PatternId {
        PatternId("Cup & Handle")
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Geometric
    }

    fn detect(&self, closes: &[f64]) -> PatternResult {
        PatternResult::from_levels(PatternDetector::id(self), self.levels(closes))
    }

    fn validate_config(&self) -> Result<()> {
        check_factor(self.stop_range_factor, "stop_range_factor")?;
        check_factor(self.reward_multiple, "reward_multiple")
    }
}

// ============================================================
// DOUBLE BOTTOM
// ============================================================

/// Double Bottom - two fixed trough indices within `tolerance * min(closes)` of each other.
///
/// Stop sits `stop_buffer * entry` below the lower trough.
#[derive(Debug, Clone, Copy)]
pub struct DoubleBottomDetector {
    pub first_trough: usize,
    pub second_trough: usize,
    pub tolerance: f64,
    pub stop_buffer: f64,
    pub reward_multiple: f64,
}

impl Default for DoubleBottomDetector {
    fn default() -> Self {
        Self {
            first_trough: helpers::DOUBLE_BOTTOM_FIRST_TROUGH,
            second_trough: helpers::DOUBLE_BOTTOM_SECOND_TROUGH,
            tolerance: helpers::DOUBLE_BOTTOM_TOLERANCE,
            stop_buffer: helpers::DOUBLE_BOTTOM_STOP_BUFFER,
            reward_multiple: helpers::REWARD_MULTIPLE,
        }
    }
}

impl DoubleBottomDetector {
    fn levels(&self, closes: &[f64]) -> Option<TradeLevels> {
        let entry = gated_entry(closes, MIN_CLOSES)?;
        let first = *closes.get(self.first_trough)?;
        let second = *closes.get(self.second_trough)?;
        let low = min_of(closes)?;

        if (first - second).abs() >= self.tolerance * low {
            return None;
        }

        // Fails closed when the buffered trough is not below the last close.
        let stop_loss = first.min(second) - self.stop_buffer * entry;
        levels_with_multiple(entry, stop_loss, self.reward_multiple)
    }
}

impl PatternDetector for DoubleBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("Double Bottom")
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Geometric
    }

    fn detect(&self, closes: &[f64]) -> PatternResult {
        PatternResult::from_levels(PatternDetector::id(self), self.levels(closes))
    }

    fn validate_config(&self) -> Result<()> {
        if self.first_trough >= self.second_trough {
            return Err(ScreenError::InvalidConfig(
                "first_trough must come before second_trough".to_string(),
            ));
        }
        if self.second_trough >= MIN_CLOSES {
            return Err(ScreenError::InvalidConfig(format!(
                "second_trough must be < {MIN_CLOSES}"
            )));
        }
        check_factor(self.tolerance, "tolerance")?;
        check_factor(self.stop_buffer, "stop_buffer")?;
        check_factor(self.reward_multiple, "reward_multiple")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cup_closes() -> Vec<f64> {
        let mut closes = vec![
            20.0, 18.0, 16.0, 14.0, 12.0, 10.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0,
            26.0,
        ];
        closes.extend((26..=40).map(f64::from));
        closes
    }

    fn double_bottom_closes() -> Vec<f64> {
        let mut closes = vec![60.0; 30];
        closes[10] = 50.0;
        closes[20] = 51.0;
        closes
    }

    #[test]
    fn test_cup_and_handle_levels() {
        let closes = cup_closes();
        assert_eq!(closes.len(), 30);

        let result = CupAndHandleDetector::with_defaults().detect(&closes);
        let levels = result.levels.expect("cup should fire");

        let entry = 40.0;
        let stop = entry - 0.3 * (40.0 - 10.0);
        assert_eq!(levels.entry, entry);
        assert_eq!(levels.stop_loss, stop);
        assert_eq!(levels.take_profit, entry + 2.0 * (entry - stop));
    }

    #[test]
    fn test_cup_and_handle_rejects_low_second_half() {
        let mut closes = cup_closes();
        closes[20] = 11.0;
        assert!(!CupAndHandleDetector::with_defaults().detect(&closes).is_found());
    }

    #[test]
    fn test_cup_and_handle_linear_recovery_not_found() {
        // 10 down to 5, then one step up per bar: the second half bottoms at 15,
        // below the (29 + 5) / 2 = 17 midpoint.
        let closes: Vec<f64> = (0..30)
            .map(|i: i32| f64::from(if i <= 5 { 10 - i } else { i }))
            .collect();
        assert_eq!(&closes[..8], &[10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 6.0, 7.0]);

        assert!(!CupAndHandleDetector::with_defaults().detect(&closes).is_found());
    }

    #[test]
    fn test_cup_and_handle_flat_series() {
        let closes = vec![50.0; 40];
        assert!(!CupAndHandleDetector::with_defaults().detect(&closes).is_found());
    }

    #[test]
    fn test_cup_and_handle_short_series() {
        let closes = cup_closes();
        assert!(!CupAndHandleDetector::with_defaults()
            .detect(&closes[1..])
            .is_found());
    }

    #[test]
    fn test_double_bottom_levels() {
        let result = DoubleBottomDetector::with_defaults().detect(&double_bottom_closes());
        let levels = result.levels.expect("double bottom should fire");

        let entry = 60.0;
        let stop = 50.0 - 0.03 * entry;
        assert_eq!(levels.entry, entry);
        assert_eq!(levels.stop_loss, stop);
        assert_eq!(levels.take_profit, entry + 2.0 * (entry - stop));
    }

    #[test]
    fn test_double_bottom_troughs_too_far_apart() {
        let mut closes = double_bottom_closes();
        closes[20] = 58.0;
        assert!(!DoubleBottomDetector::with_defaults().detect(&closes).is_found());
    }

    #[test]
    fn test_double_bottom_fails_closed_when_stop_above_entry() {
        let mut closes = vec![100.0; 30];
        closes[29] = 10.0;
        assert!(!DoubleBottomDetector::with_defaults().detect(&closes).is_found());
    }

    #[test]
    fn test_double_bottom_validate_config() {
        let bad = DoubleBottomDetector {
            second_trough: 5,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());

        let bad = DoubleBottomDetector {
            second_trough: 40,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());

        assert!(DoubleBottomDetector::with_defaults().validate_config().is_ok());
    }

    #[test]
    fn test_cup_validate_config() {
        let bad = CupAndHandleDetector {
            stop_range_factor: f64::NAN,
            ..Default::default()
        };
        assert!(bad.validate_config().is_err());
    }
}
