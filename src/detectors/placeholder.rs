//! Placeholder chart pattern detectors
//!
//! Named catalog entries without a geometric test. Every placeholder shares
//! [`placeholder_levels`]: it fires on any series of at least
//! [`MIN_CLOSES`](super::helpers::MIN_CLOSES) closes with a 3% stop and a 6% target.
//! The name is only a label.

use super::helpers::{gated_entry, MIN_CLOSES, PLACEHOLDER_STOP_FACTOR, PLACEHOLDER_TARGET_FACTOR};
use crate::{DetectorKind, PatternDetector, PatternId, PatternResult, Result, ScreenError, TradeLevels};

/// The placeholder catalog, in registration order
pub const PLACEHOLDER_PATTERNS: [&str; 13] = [
    "Head & Shoulders",
    "Inverse Head & Shoulders",
    "Ascending Triangle",
    "Descending Triangle",
    "Symmetrical Triangle",
    "Bull Flag",
    "Bear Flag",
    "Rising Wedge",
    "Falling Wedge",
    "Rectangle",
    "Triple Top",
    "Triple Bottom",
    "Rounding Bottom",
];

/// The shared placeholder rule. Non-positive entries fail closed.
#[inline]
pub fn placeholder_levels(closes: &[f64]) -> Option<TradeLevels> {
    let entry = gated_entry(closes, MIN_CLOSES)?;
    TradeLevels::long(
        entry,
        PLACEHOLDER_STOP_FACTOR * entry,
        PLACEHOLDER_TARGET_FACTOR * entry,
    )
}

/// Unconditional-trigger detector, labelled with a catalog name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderDetector {
    name: &'static str,
}

impl PlaceholderDetector {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// One detector per catalog name
    pub fn catalog() -> impl Iterator<Item = PlaceholderDetector> {
        PLACEHOLDER_PATTERNS.into_iter().map(PlaceholderDetector::new)
    }
}

impl PatternDetector for PlaceholderDetector {
    fn id(&self) -> PatternId {
        PatternId(self.name)
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Placeholder
    }

    fn detect(&self, closes: &[f64]) -> PatternResult {
        PatternResult::from_levels(PatternDetector::id(self), placeholder_levels(closes))
    }

    fn validate_config(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScreenError::InvalidConfig(
                "placeholder name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
