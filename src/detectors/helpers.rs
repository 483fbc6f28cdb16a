//! Common helper functions for buy point detection
//!
//! Windowing, guarded percentage math, rounding and moving averages shared
//! across all detector modules.

use crate::OHLCV;

// ============================================================
// THRESHOLDS
// ============================================================

/// Baselines with a magnitude at or below this are treated as zero
pub const ZERO_EPSILON: f64 = 1e-12;

/// Decimal places for prices inside reason strings and pivot bounds
pub const PRICE_DECIMALS: i32 = 4;

/// Decimal places for percentages and reported prices
pub const PCT_DECIMALS: i32 = 2;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Trailing window of at most `len` bars.
#[inline]
pub fn tail<T>(bars: &[T], len: usize) -> &[T] {
    &bars[bars.len().saturating_sub(len)..]
}

/// Percentage change from `base` to `value`, measured against `|base|`.
///
/// Returns 0.0 when the baseline is zero or near-zero, so a flat DIF or a
/// zero price never produces an infinite magnitude.
#[inline]
pub fn pct_change(base: f64, value: f64) -> f64 {
    if base.abs() <= ZERO_EPSILON {
        return 0.0;
    }
    (value - base) / base.abs() * 100.0
}

#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Highest high of the slice, `-inf` when empty.
#[inline]
pub fn highest_high<T: OHLCV>(bars: &[T]) -> f64 {
    bars.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max)
}

/// Lowest low of the slice, `+inf` when empty.
#[inline]
pub fn lowest_low<T: OHLCV>(bars: &[T]) -> f64 {
    bars.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min)
}

/// Simple moving average of closes via prefix sums.
/// `None` until `period` bars are available.
pub fn sma_closes<T: OHLCV>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; bars.len()];
    }

    let mut prefix = Vec::with_capacity(bars.len() + 1);
    let mut running = 0.0;
    prefix.push(running);
    for bar in bars {
        running += bar.close();
        prefix.push(running);
    }

    (0..bars.len())
        .map(|i| {
            (i + 1 >= period).then(|| (prefix[i + 1] - prefix[i + 1 - period]) / period as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn closes(values: &[f64]) -> Vec<Bar> {
        values
            .iter()
            .map(|&c| Bar::new(c, c + 1.0, c - 1.0, c, 1.0))
            .collect()
    }

    #[test]
    fn test_tail() {
        let v = [1, 2, 3, 4, 5];
        assert_eq!(tail(&v, 2), &[4, 5]);
        assert_eq!(tail(&v, 10), &v);
        assert!(tail(&v, 0).is_empty());
    }

    #[test]
    fn test_pct_change_guards_zero() {
        assert_eq!(pct_change(0.0, 5.0), 0.0);
        assert!((pct_change(2.0, 3.5) - 75.0).abs() < 1e-9);
        // measured against |base|: -2 -> -1 is a 50% rise
        assert!((pct_change(-2.0, -1.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(9.123_456, 4), 9.1235);
        assert_eq!(round_to(1.005_1, 2), 1.01);
    }

    #[test]
    fn test_sma_closes() {
        let bars = closes(&[1.0, 2.0, 3.0, 4.0]);
        let sma = sma_closes(&bars, 2);
        assert_eq!(sma, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
        assert_eq!(sma_closes(&bars, 0), vec![None; 4]);
        assert_eq!(sma_closes(&bars, 5), vec![None; 4]);
    }

    #[test]
    fn test_extremes_of_slice() {
        let bars = closes(&[5.0, 9.0, 2.0]);
        assert_eq!(highest_high(&bars), 10.0);
        assert_eq!(lowest_low(&bars), 1.0);
        let empty: Vec<Bar> = Vec::new();
        assert_eq!(highest_high(&empty), f64::NEG_INFINITY);
    }
}
