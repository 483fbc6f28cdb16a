//! Buy point detectors
//!
//! Structural building blocks and the three buy point checks built on them.
//!
//! # Building blocks
//!
//! - **Extrema**: strict local highs / lows of a window.
//! - **Pivot**: three-segment overlap range `[ZD, ZG]`.
//! - **Divergence**: price / DIF bottom divergence between two local lows.
//! - **Strength**: 0-100 score of a bottom divergence.
//! - **Cross**: fast / slow SMA golden cross.
//!
//! # Buy points
//!
//! - **First buy**: bottom divergence, or a same-day golden cross.
//! - **Second buy**: close just above the first buy level, or a golden cross above it.
//! - **Third buy**: breakout above ZG whose pullback holds above ZG.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod cross;
pub mod divergence;
pub mod extrema;
pub mod first_buy;
pub mod pivot;
pub mod second_buy;
pub mod strength;
pub mod third_buy;

impl_with_defaults!(
    cross::MaCross,
    divergence::DivergenceDetector,
    first_buy::FirstBuyDetector,
    pivot::PivotDetector,
    second_buy::SecondBuyDetector,
    strength::StrengthScorer,
    third_buy::BreakoutPullback,
    third_buy::ThirdBuyDetector,
);

// Re-export all detectors for convenience
pub use cross::*;
pub use divergence::*;
pub use extrema::*;
pub use first_buy::*;
pub use helpers::*;
pub use pivot::*;
pub use second_buy::*;
pub use strength::*;
pub use third_buy::*;
