//! Bottom divergence between price lows and DIF
//!
//! The two lowest-priced local lows of the lookback window are compared:
//! the lower one must undercut the other in price while its DIF stays higher.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::extrema::{find_extrema, Extremum};
use super::helpers::tail;
use crate::{
    params::{get_period, ParamMeta, ParameterizedDetector},
    Period, Result, OHLCV,
};

/// Why two lows do not form a bottom divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DivergenceFailure {
    NotEnoughLows,
    MissingOscillator,
    NoNewLow,
    OscillatorNewLow,
}

impl DivergenceFailure {
    pub fn reason(self) -> &'static str {
        match self {
            DivergenceFailure::NotEnoughLows => "fewer than two local lows in window",
            DivergenceFailure::MissingOscillator => "DIF missing at a local low",
            DivergenceFailure::NoNewLow => "price did not make a new low",
            DivergenceFailure::OscillatorNewLow => "oscillator also made a new low",
        }
    }
}

/// Pairwise rule: `current` undercuts `previous` in price while its DIF stays higher.
pub fn compare_lows(
    current: &Extremum,
    previous: &Extremum,
) -> std::result::Result<(), DivergenceFailure> {
    if current.price >= previous.price {
        return Err(DivergenceFailure::NoNewLow);
    }
    let (Some(current_dif), Some(previous_dif)) = (current.dif, previous.dif) else {
        return Err(DivergenceFailure::MissingOscillator);
    };
    if current_dif <= previous_dif {
        return Err(DivergenceFailure::OscillatorNewLow);
    }
    Ok(())
}

/// Outcome of a base divergence scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Divergence {
    pub found: bool,
    /// Series index where the scanned window starts
    pub window_start: usize,
    /// Lowest local low; its index is relative to the full series
    pub current: Option<Extremum>,
    /// Second-lowest local low
    pub previous: Option<Extremum>,
    pub reasons: Vec<String>,
}

impl Divergence {
    fn rejected(window_start: usize, failure: DivergenceFailure) -> Self {
        Self {
            found: false,
            window_start,
            current: None,
            previous: None,
            reasons: vec![failure.reason().to_string()],
        }
    }

    /// Price of the new low, if a divergence was found
    pub fn new_low(&self) -> Option<f64> {
        self.current.filter(|_| self.found).map(|e| e.price)
    }
}

/// Two-lowest-lows divergence detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceDetector {
    pub lookback: Period,
}

impl Default for DivergenceDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(30),
        }
    }
}

impl DivergenceDetector {
    pub fn new(lookback: usize) -> Result<Self> {
        Ok(Self {
            lookback: Period::new(lookback)?,
        })
    }

    pub fn detect<T: OHLCV>(&self, bars: &[T]) -> Divergence {
        let window = tail(bars, self.lookback.get());
        let window_start = bars.len() - window.len();

        let lows = find_extrema(window).lows_by_price();
        let [current, previous, ..] = lows.as_slice() else {
            debug!(lows = lows.len(), "divergence: not enough local lows");
            return Divergence::rejected(window_start, DivergenceFailure::NotEnoughLows);
        };
        let current = Extremum {
            index: current.index + window_start,
            ..*current
        };
        let previous = Extremum {
            index: previous.index + window_start,
            ..*previous
        };

        let mut divergence = Divergence {
            found: false,
            window_start,
            current: Some(current),
            previous: Some(previous),
            reasons: Vec::new(),
        };

        match compare_lows(&current, &previous) {
            Ok(()) => {
                trace!(
                    low = current.price,
                    dif = ?current.dif,
                    prev_low = previous.price,
                    prev_dif = ?previous.dif,
                    "bottom divergence"
                );
                divergence.found = true;
            }
            Err(failure) => {
                debug!(reason = failure.reason(), "divergence: rejected");
                divergence.reasons.push(failure.reason().to_string());
            }
        }
        divergence
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static DIVERGENCE_PARAMS: &[ParamMeta] = &[ParamMeta::period(
    "lookback",
    30.0,
    (20.0, 60.0, 5.0),
    "Bars searched for local lows",
)];

impl ParameterizedDetector for DivergenceDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DIVERGENCE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", 30)?,
        })
    }

    fn detector_name() -> &'static str {
        "DIVERGENCE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn low(price: f64, dif: f64) -> Extremum {
        Extremum {
            index: 0,
            price,
            dif: Some(dif),
            timestamp: None,
        }
    }

    /// Flat bars around 110 with local lows `(index, low, dif)`
    fn with_lows(n: usize, lows: &[(usize, f64, f64)]) -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..n)
            .map(|i| {
                Bar::new(110.0, 111.0, 109.0, 110.0, 1.0)
                    .at(i as i64)
                    .with_oscillator(0.0, 0.0, 0.0)
            })
            .collect();
        for &(i, price, dif) in lows {
            bars[i].low = price;
            bars[i].dif = Some(dif);
        }
        bars
    }

    #[test]
    fn test_compare_lows() {
        assert_eq!(compare_lows(&low(95.0, 3.5), &low(100.0, 2.0)), Ok(()));
        assert_eq!(
            compare_lows(&low(95.0, 1.5), &low(100.0, 2.0)),
            Err(DivergenceFailure::OscillatorNewLow)
        );
        assert_eq!(
            compare_lows(&low(100.0, 3.5), &low(100.0, 2.0)),
            Err(DivergenceFailure::NoNewLow)
        );
    }

    #[test]
    fn test_swapped_lows_do_not_diverge() {
        // roles swapped
        assert!(compare_lows(&low(100.0, 2.0), &low(95.0, 3.5)).is_err());
        // oscillator values swapped
        assert!(compare_lows(&low(95.0, 2.0), &low(100.0, 3.5)).is_err());
    }

    #[test]
    fn test_missing_oscillator() {
        let mut current = low(95.0, 3.5);
        current.dif = None;
        assert_eq!(
            compare_lows(&current, &low(100.0, 2.0)),
            Err(DivergenceFailure::MissingOscillator)
        );
    }

    #[test]
    fn test_detect_divergence() {
        let bars = with_lows(30, &[(14, 100.0, 2.0), (27, 95.0, 3.5)]);
        let divergence = DivergenceDetector::with_defaults().detect(&bars);
        assert!(divergence.found);
        assert!(divergence.reasons.is_empty());
        assert_eq!(divergence.current.map(|e| e.index), Some(27));
        assert_eq!(divergence.previous.map(|e| e.index), Some(14));
        assert_eq!(divergence.new_low(), Some(95.0));
    }

    #[test]
    fn test_lowest_lows_not_most_recent() {
        // the newest low at 104 is ignored; 95 vs 100 decides
        let bars = with_lows(
            30,
            &[(5, 100.0, 2.0), (15, 95.0, 1.0), (27, 104.0, 5.0)],
        );
        let divergence = DivergenceDetector::with_defaults().detect(&bars);
        assert!(!divergence.found);
        assert_eq!(divergence.current.map(|e| e.index), Some(15));
        assert_eq!(divergence.reasons, ["oscillator also made a new low"]);
        assert_eq!(divergence.new_low(), None);
    }

    #[test]
    fn test_indices_are_series_relative() {
        let bars = with_lows(50, &[(34, 100.0, 2.0), (45, 95.0, 3.5)]);
        let divergence = DivergenceDetector::with_defaults().detect(&bars);
        assert_eq!(divergence.window_start, 20);
        assert_eq!(divergence.current.map(|e| e.index), Some(45));
    }

    #[test]
    fn test_single_low() {
        let bars = with_lows(30, &[(10, 100.0, 2.0)]);
        let divergence = DivergenceDetector::with_defaults().detect(&bars);
        assert!(!divergence.found);
        assert_eq!(divergence.reasons, ["fewer than two local lows in window"]);
    }
}
