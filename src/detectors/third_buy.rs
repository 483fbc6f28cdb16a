//! Third buy: breakout above a pivot whose pullback holds above ZG
//!
//! Two layers:
//!
//! - [`BreakoutPullback`] validates a bar window against a known pivot.
//! - [`ThirdBuyDetector`] resolves the pivot itself and runs either the
//!   detailed check or the lighter same-day check.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::helpers::{lowest_low, round_to, tail, PCT_DECIMALS, PRICE_DECIMALS};
use super::pivot::{Pivot, PivotDetector};
use crate::{
    params::{get_period, get_price, ParamMeta, ParameterizedDetector},
    BuyPointDetector, Level, Outcome, Period, Result, Signal, SignalError, SignalKind, OHLCV,
};

/// Extra bars scanned beyond `break_bars + pullback_bars`
pub const WINDOW_SLACK: usize = 5;

/// Same-day check: one of this many most recent closes must be above ZG
pub const TODAY_BREAKOUT_BARS: usize = 5;

/// Detailed check and multi-level scan refuse shorter series
pub const DETAIL_MIN_BARS: usize = 30;

// ============================================================
// BREAKOUT / PULLBACK VALIDATOR
// ============================================================

/// Breakout-pullback rule against a known pivot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutPullback {
    pub break_bars: Period,
    pub pullback_bars: Period,
    /// Final close must reach `ZG + min_clearance`
    pub min_clearance: f64,
}

impl Default for BreakoutPullback {
    fn default() -> Self {
        Self {
            break_bars: Period::new_const(5),
            pullback_bars: Period::new_const(10),
            min_clearance: 0.0,
        }
    }
}

/// Per-condition outcome of [`BreakoutPullback::validate_detail`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThirdBuyCheck {
    pub broke_out: bool,
    pub pullback_held: bool,
    pub closed_above: bool,
    /// Breakout bar, relative to the scanned window
    pub breakout_index: Option<usize>,
    /// Lowest low after the breakout bar
    pub pullback_low: Option<f64>,
    pub reasons: Vec<String>,
}

impl ThirdBuyCheck {
    fn rejected(reason: String) -> Self {
        Self {
            broke_out: false,
            pullback_held: false,
            closed_above: false,
            breakout_index: None,
            pullback_low: None,
            reasons: vec![reason],
        }
    }

    #[inline]
    pub fn passed(&self) -> bool {
        self.broke_out && self.pullback_held && self.closed_above
    }
}

impl BreakoutPullback {
    pub fn new(break_bars: usize, pullback_bars: usize, min_clearance: f64) -> Result<Self> {
        let validator = Self {
            break_bars: Period::new(break_bars)?,
            pullback_bars: Period::new(pullback_bars)?,
            min_clearance,
        };
        validator.validate_config()?;
        Ok(validator)
    }

    /// Bars the rule looks at
    #[inline]
    pub fn window_len(&self) -> usize {
        self.min_bars() + WINDOW_SLACK
    }

    #[inline]
    pub fn min_bars(&self) -> usize {
        self.break_bars.get() + self.pullback_bars.get()
    }

    pub fn validate_config(&self) -> Result<()> {
        if !self.min_clearance.is_finite() || self.min_clearance < 0.0 {
            return Err(SignalError::InvalidConfig(format!(
                "min_clearance must be finite and >= 0, got {}",
                self.min_clearance
            )));
        }
        Ok(())
    }

    /// Pass / fail only.
    pub fn validate<T: OHLCV>(&self, bars: &[T], pivot: &Pivot) -> bool {
        bars.len() >= self.min_bars() && self.evaluate(bars, pivot).passed()
    }

    /// Each condition with its reason; needs two more bars than [`validate`](Self::validate).
    pub fn validate_detail<T: OHLCV>(&self, bars: &[T], pivot: &Pivot) -> ThirdBuyCheck {
        let need = self.min_bars() + 2;
        if bars.len() < need {
            return ThirdBuyCheck::rejected(format!(
                "not enough bars (len={}, need {need})",
                bars.len()
            ));
        }
        self.evaluate(bars, pivot)
    }

    fn evaluate<T: OHLCV>(&self, bars: &[T], pivot: &Pivot) -> ThirdBuyCheck {
        let zg = pivot.zg;
        let window = tail(bars, self.window_len());

        let Some(breakout) = breakout_index(window, zg) else {
            debug!(zg, bars = window.len(), "third buy: no close broke above ZG");
            return ThirdBuyCheck::rejected("no recent close broke above ZG".to_string());
        };

        let mut reasons = Vec::new();

        let after = &window[breakout + 1..];
        let pullback_low = (!after.is_empty()).then(|| lowest_low(after));
        let pullback_held = pullback_low.is_some_and(|low| low > zg);
        match pullback_low {
            None => reasons.push("no pullback bars after the breakout".to_string()),
            Some(low) if !pullback_held => reasons.push(format!(
                "pullback low {:.4} <= ZG {:.4}",
                low, zg
            )),
            Some(_) => {}
        }

        let close = window[window.len() - 1].close();
        let floor = zg + self.min_clearance;
        let closed_above = close >= floor;
        if !closed_above {
            reasons.push(if self.min_clearance > 0.0 {
                format!(
                    "close {:.4} < ZG {:.4} + clearance {:.4}",
                    close, zg, self.min_clearance
                )
            } else {
                format!("close {:.4} < ZG {:.4}", close, zg)
            });
        }

        if reasons.is_empty() {
            trace!(zg, breakout, "third buy: breakout and pullback hold");
        } else {
            debug!(zg, breakout, ?pullback_low, close, "third buy: conditions failed");
        }

        ThirdBuyCheck {
            broke_out: true,
            pullback_held,
            closed_above,
            breakout_index: Some(breakout),
            pullback_low,
            reasons,
        }
    }
}

/// Most recent upward crossing of `zg` by close, 0 if the whole window is above.
fn breakout_index<T: OHLCV>(window: &[T], zg: f64) -> Option<usize> {
    (0..window.len()).rev().find(|&i| {
        window[i].close() > zg && (i == 0 || window[i - 1].close() <= zg)
    })
}

// ============================================================
// THIRD BUY DETECTOR
// ============================================================

/// Outcome of the detailed third buy check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThirdBuyDetail {
    /// Bounds rounded to 4 decimals
    pub pivot: Option<Pivot>,
    pub broke_out: bool,
    pub pullback_held: bool,
    pub closed_above: bool,
    pub passed: bool,
    /// Empty when passed
    pub reasons: Vec<String>,
}

impl ThirdBuyDetail {
    pub fn rejected(reason: String) -> Self {
        Self {
            pivot: None,
            broke_out: false,
            pullback_held: false,
            closed_above: false,
            passed: false,
            reasons: vec![reason],
        }
    }
}

/// Same-day third buy check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThirdBuyToday {
    pub found: bool,
    pub pivot: Option<Pivot>,
    pub price: Option<f64>,
    pub reasons: Vec<String>,
}

/// Reported third buy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThirdBuy {
    pub price: f64,
    pub pivot: Pivot,
    pub reasons: Vec<String>,
}

impl Outcome for ThirdBuyToday {
    fn passed(&self) -> bool {
        self.found
    }

    fn reasons(&self) -> &[String] {
        &self.reasons
    }

    fn to_signal(&self) -> Option<Signal> {
        if !self.found {
            return None;
        }
        Some(Signal::ThirdBuy(ThirdBuy {
            price: self.price?,
            pivot: self.pivot?,
            reasons: Vec::new(),
        }))
    }

    fn rejected(reason: String) -> Self {
        Self {
            found: false,
            pivot: None,
            price: None,
            reasons: vec![reason],
        }
    }
}

/// Pivot resolution plus breakout-pullback validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThirdBuyDetector {
    pub pivot: PivotDetector,
    pub validator: BreakoutPullback,
}

impl Default for ThirdBuyDetector {
    fn default() -> Self {
        Self {
            pivot: PivotDetector {
                segment_bars: Period::new_const(6),
                lookback: Period::new_const(50),
            },
            validator: BreakoutPullback::default(),
        }
    }
}

impl ThirdBuyDetector {
    /// Copy with the pivot window tuned for a level holding `len` bars.
    ///
    /// Daily: segment 6 over 30 bars. Intraday: segment 5 over `min(60, len - 5)`.
    pub fn for_level(&self, level: Level, len: usize) -> Self {
        let pivot = if level.is_intraday() {
            PivotDetector {
                segment_bars: Period::new_const(5),
                lookback: Period::new_const(len.saturating_sub(5).clamp(1, 60)),
            }
        } else {
            PivotDetector {
                segment_bars: Period::new_const(6),
                lookback: Period::new_const(30),
            }
        };
        Self {
            pivot,
            validator: self.validator.clone(),
        }
    }

    /// Full check with every condition reported.
    pub fn detail<T: OHLCV>(&self, bars: &[T]) -> ThirdBuyDetail {
        if bars.len() < DETAIL_MIN_BARS {
            return ThirdBuyDetail::rejected(format!(
                "fewer than {DETAIL_MIN_BARS} bars (len={})",
                bars.len()
            ));
        }
        let Some(pivot) = self.pivot.find(bars) else {
            return ThirdBuyDetail::rejected(
                "no valid pivot (segments do not overlap)".to_string(),
            );
        };

        let check = self.validator.validate_detail(bars, &pivot);
        let passed = check.passed();
        ThirdBuyDetail {
            pivot: Some(pivot.rounded(PRICE_DECIMALS)),
            broke_out: check.broke_out,
            pullback_held: check.pullback_held,
            closed_above: check.closed_above,
            passed,
            reasons: if passed { Vec::new() } else { check.reasons },
        }
    }
}

impl BuyPointDetector for ThirdBuyDetector {
    type Check = ThirdBuyToday;

    fn kind(&self) -> SignalKind {
        SignalKind::ThirdBuy
    }

    fn min_bars(&self) -> usize {
        self.pivot.min_bars()
    }

    fn check_today<T: OHLCV>(&self, bars: &[T]) -> ThirdBuyToday {
        let Some(last) = bars.last() else {
            return ThirdBuyToday::rejected("empty series".to_string());
        };
        let Some(pivot) = self.pivot.find(bars) else {
            return ThirdBuyToday::rejected("no valid pivot".to_string());
        };

        let zg = pivot.zg;
        let mut reasons = Vec::new();
        if last.close() <= zg {
            reasons.push(format!("close {:.4} <= ZG {:.4}", last.close(), zg));
        }
        if last.low() <= zg {
            reasons.push(format!("low {:.4} <= ZG {:.4}", last.low(), zg));
        }
        if !tail(bars, TODAY_BREAKOUT_BARS).iter().any(|b| b.close() > zg) {
            reasons.push(format!(
                "no close above ZG in the last {TODAY_BREAKOUT_BARS} bars"
            ));
        }

        ThirdBuyToday {
            found: reasons.is_empty(),
            pivot: Some(pivot.rounded(PRICE_DECIMALS)),
            price: Some(round_to(last.close(), PCT_DECIMALS)),
            reasons,
        }
    }

    fn validate_config(&self) -> Result<()> {
        self.pivot.validate_config()?;
        self.validator.validate_config()
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static THIRD_BUY_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("segment_bars", 6.0, (4.0, 10.0, 1.0), "Bars per pivot segment"),
    ParamMeta::period("lookback", 50.0, (30.0, 120.0, 5.0), "Pivot lookback window"),
    ParamMeta::period("break_bars", 5.0, (2.0, 10.0, 1.0), "Bars allowed for the breakout"),
    ParamMeta::period("pullback_bars", 10.0, (5.0, 20.0, 1.0), "Bars allowed for the pullback"),
    ParamMeta::price(
        "min_clearance",
        0.0,
        (0.0, 1.0, 0.1),
        "Final close must reach ZG plus this amount",
    ),
];

impl ParameterizedDetector for ThirdBuyDetector {
    fn param_meta() -> &'static [ParamMeta] {
        THIRD_BUY_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            pivot: PivotDetector {
                segment_bars: get_period(params, "segment_bars", 6)?,
                lookback: get_period(params, "lookback", 50)?,
            },
            validator: BreakoutPullback {
                break_bars: get_period(params, "break_bars", 5)?,
                pullback_bars: get_period(params, "pullback_bars", 10)?,
                min_clearance: get_price(params, "min_clearance", 0.0)?,
            },
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "THIRD_BUY"
    }
}
