//! Chart pattern detectors
//!
//! Every detector is a pure function of a close series (oldest first) and
//! proposes long-only levels when it fires.
//!
//! # Pattern Categories
//!
//! - **Geometric (2)**: Cup & Handle, Double Bottom. Real shape tests.
//! - **Placeholder (13)**: Head & Shoulders, triangles, flags, wedges, etc.
//!   These share one unconditional rule and differ only by name.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod geometric;
pub mod placeholder;

// Re-export all detectors for convenience
pub use geometric::*;
pub use helpers::*;
pub use placeholder::*;
