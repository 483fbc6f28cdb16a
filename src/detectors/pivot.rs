//! Consolidation range (pivot) detection
//!
//! The last `3 * segment_bars` bars of the lookback window are split into
//! three abutting segments. Their trading ranges must overlap:
//! `ZG = min(segment highs)`, `ZD = max(segment lows)`, valid only if `ZG > ZD`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::helpers::{highest_high, lowest_low, pct_change, round_to, tail};
use crate::{
    params::{get_period, ParamMeta, ParameterizedDetector},
    Period, Result, SignalError, OHLCV,
};

/// Overlap range `[zd, zg]` of three consecutive segments.
///
/// [`Pivot::new`] and deserialization enforce `zg > zd`; a struct literal
/// does not, and validators assume it holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pivot {
    /// Lower bound (ZD)
    pub zd: f64,
    /// Upper bound (ZG)
    pub zg: f64,
}

impl<'de> Deserialize<'de> for Pivot {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Bounds {
            zd: f64,
            zg: f64,
        }

        let Bounds { zd, zg } = Bounds::deserialize(d)?;
        Pivot::new(zd, zg).ok_or_else(|| {
            serde::de::Error::custom(format!("pivot needs zg > zd, got zd={zd} zg={zg}"))
        })
    }
}

impl Pivot {
    /// `None` unless `zg > zd`
    pub fn new(zd: f64, zg: f64) -> Option<Self> {
        (zg > zd).then_some(Self { zd, zg })
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.zg - self.zd
    }

    /// Width relative to ZD, in percent
    #[inline]
    pub fn width_pct(&self) -> f64 {
        pct_change(self.zd, self.zg)
    }

    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        (self.zd..=self.zg).contains(&price)
    }

    pub fn rounded(&self, decimals: i32) -> Self {
        Self {
            zd: round_to(self.zd, decimals),
            zg: round_to(self.zg, decimals),
        }
    }
}

/// Three-segment overlap pivot detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PivotDetector {
    /// Bars per segment
    pub segment_bars: Period,
    /// Trailing bars considered before segmenting
    pub lookback: Period,
}

impl Default for PivotDetector {
    fn default() -> Self {
        Self {
            segment_bars: Period::new_const(8),
            lookback: Period::new_const(50),
        }
    }
}

impl PivotDetector {
    pub fn new(segment_bars: usize, lookback: usize) -> Result<Self> {
        let detector = Self {
            segment_bars: Period::new(segment_bars)?,
            lookback: Period::new(lookback)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    #[inline]
    pub fn min_bars(&self) -> usize {
        self.segment_bars.get() * 3
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.lookback.get() < self.min_bars() {
            return Err(SignalError::InvalidConfig(format!(
                "pivot lookback {} shorter than three segments of {}",
                self.lookback.get(),
                self.segment_bars.get()
            )));
        }
        Ok(())
    }

    /// Pivot of the most recent bars, `None` if too short or the segments do not overlap.
    pub fn find<T: OHLCV>(&self, bars: &[T]) -> Option<Pivot> {
        let segment = self.segment_bars.get();
        let window = tail(bars, self.lookback.get());
        if window.len() < segment * 3 {
            debug!(bars = window.len(), need = segment * 3, "pivot: not enough bars");
            return None;
        }

        let (zg, zd) = tail(window, segment * 3).chunks_exact(segment).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(zg, zd), seg| (zg.min(highest_high(seg)), zd.max(lowest_low(seg))),
        );

        match Pivot::new(zd, zg) {
            Some(pivot) => {
                trace!(zd, zg, "pivot found");
                Some(pivot)
            }
            None => {
                debug!(zd, zg, "pivot: segments do not overlap");
                None
            }
        }
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static PIVOT_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("segment_bars", 8.0, (4.0, 12.0, 1.0), "Bars per segment"),
    ParamMeta::period(
        "lookback",
        50.0,
        (24.0, 120.0, 2.0),
        "Trailing bars considered before segmenting",
    ),
];

impl ParameterizedDetector for PivotDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PIVOT_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            segment_bars: get_period(params, "segment_bars", 8)?,
            lookback: get_period(params, "lookback", 50)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "PIVOT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn segment(n: usize, high: f64, low: f64) -> Vec<Bar> {
        (0..n)
            .map(|_| Bar::new(low, high, low, high, 1.0))
            .collect()
    }

    /// 16 leading bars, then three 8-bar segments
    fn three_segments(highs: [f64; 3], lows: [f64; 3]) -> Vec<Bar> {
        let mut bars = segment(16, 20.0, 1.0);
        for (h, l) in highs.into_iter().zip(lows) {
            bars.extend(segment(8, h, l));
        }
        bars
    }

    #[test]
    fn test_overlapping_segments() {
        let bars = three_segments([10.0, 9.0, 11.0], [5.0, 6.0, 4.0]);
        assert_eq!(bars.len(), 40);
        let pivot = PivotDetector::new(8, 50).unwrap().find(&bars).unwrap();
        assert_eq!(pivot, Pivot { zd: 6.0, zg: 9.0 });
        assert_eq!(pivot.width(), 3.0);
        assert!(pivot.contains(7.5));
    }

    #[test]
    fn test_disjoint_segments() {
        let bars = three_segments([5.0, 7.0, 9.0], [4.0, 6.0, 8.0]);
        assert!(PivotDetector::with_defaults().find(&bars).is_none());
    }

    #[test]
    fn test_touching_segments_are_rejected() {
        // ZG == ZD is not a range
        let bars = three_segments([6.0, 8.0, 7.0], [5.0, 6.0, 4.0]);
        assert!(PivotDetector::with_defaults().find(&bars).is_none());
    }

    #[test]
    fn test_requires_three_segments() {
        let bars = segment(23, 10.0, 5.0);
        assert!(PivotDetector::with_defaults().find(&bars).is_none());
        let bars = segment(24, 10.0, 5.0);
        assert!(PivotDetector::with_defaults().find(&bars).is_some());
    }

    #[test]
    fn test_lookback_truncates_first() {
        // 3 * 6 = 18 bars needed, but lookback keeps only the last 15
        let detector = PivotDetector {
            segment_bars: Period::new_const(6),
            lookback: Period::new_const(15),
        };
        assert!(detector.find(&segment(40, 10.0, 5.0)).is_none());
        assert!(detector.validate_config().is_err());
    }

    #[test]
    fn test_pivot_constructor() {
        assert!(Pivot::new(6.0, 9.0).is_some());
        assert!(Pivot::new(9.0, 9.0).is_none());
        assert!(Pivot::new(9.0, 6.0).is_none());
        let p = Pivot::new(8.0, 9.0).unwrap();
        assert!((p.width_pct() - 12.5).abs() < 1e-9);
        assert_eq!(Pivot::new(1.234_56, 2.0).unwrap().rounded(2).zd, 1.23);
    }

    #[test]
    fn test_deserialize_checks_bounds() {
        let pivot: Pivot = serde_json::from_str(r#"{"zd": 6.0, "zg": 9.0}"#).unwrap();
        assert_eq!(pivot, Pivot { zd: 6.0, zg: 9.0 });
        assert!(serde_json::from_str::<Pivot>(r#"{"zd": 9.0, "zg": 6.0}"#).is_err());
        assert!(serde_json::from_str::<Pivot>(r#"{"zd": 9.0, "zg": 9.0}"#).is_err());
    }

    #[test]
    fn test_with_params() {
        let mut params = HashMap::new();
        params.insert("segment_bars", 6.0);
        let detector = PivotDetector::with_params(&params).unwrap();
        assert_eq!(detector.segment_bars.get(), 6);
        assert_eq!(detector.lookback.get(), 50);

        params.insert("lookback", 10.0);
        assert!(PivotDetector::with_params(&params).is_err());
    }
}
