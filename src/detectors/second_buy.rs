//! Second buy: continuation entry above the first buy level
//!
//! Two variants share the detector:
//!
//! - [`check_today`](crate::BuyPointDetector::check_today) takes the lowest
//!   local low of the window as a proxy first buy level and fires when the
//!   last close sits just above it, or on a golden cross above it. No bar
//!   after the proxy level may trade at or below it.
//! - [`SecondBuyDetector::detect_history`] requires a confirmed bottom
//!   divergence and takes the lowest later low above that level.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::cross::MaCross;
use super::divergence::DivergenceDetector;
use super::extrema::find_extrema;
use super::helpers::{lowest_low, pct_change, round_to, tail, PCT_DECIMALS, PRICE_DECIMALS};
use super::pivot::{Pivot, PivotDetector};
use crate::{
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    BuyPointDetector, Outcome, Period, Ratio, Result, Signal, SignalKind, OHLCV,
};

/// Which path fired a same-day second buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondBuyTrigger {
    /// Close within `max_rise` above the first buy level
    Pullback,
    /// Golden cross on the last bar, close above the first buy level
    GoldenCross,
}

/// Ranking score of a second buy
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SecondBuyScore {
    /// First buy level to second buy level
    pub rise_pct: f64,
    /// Second buy level to the last close
    pub potential_pct: f64,
    /// Pivot width relative to ZD, 0 without a pivot
    pub pivot_width_pct: f64,
    /// `0.4 * potential + 0.3 * rise + 0.3 * pivot width`
    pub score: f64,
}

impl SecondBuyScore {
    pub fn compute(first_level: f64, second_level: f64, close: f64, pivot: Option<&Pivot>) -> Self {
        let rise_pct = pct_change(first_level, second_level);
        let potential_pct = pct_change(second_level, close);
        let pivot_width_pct = pivot.map_or(0.0, Pivot::width_pct);
        let score = 0.4 * potential_pct + 0.3 * rise_pct + 0.3 * pivot_width_pct;

        Self {
            rise_pct: round_to(rise_pct, PCT_DECIMALS),
            potential_pct: round_to(potential_pct, PCT_DECIMALS),
            pivot_width_pct: round_to(pivot_width_pct, PCT_DECIMALS),
            score: round_to(score, PCT_DECIMALS),
        }
    }
}

/// Same-day second buy check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondBuyToday {
    pub found: bool,
    pub trigger: Option<SecondBuyTrigger>,
    /// Lowest local low of the window
    pub first_buy_level: Option<f64>,
    /// Lowest low since the first buy bar, `None` when it broke the first buy level
    pub second_buy_level: Option<f64>,
    pub price: Option<f64>,
    /// Pivot formed after the first buy bar, if any
    pub pivot: Option<Pivot>,
    pub score: Option<SecondBuyScore>,
    pub reasons: Vec<String>,
}

/// Reported second buy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondBuy {
    pub price: f64,
    pub first_buy_level: f64,
    pub trigger: SecondBuyTrigger,
    pub pivot: Option<Pivot>,
    pub score: Option<SecondBuyScore>,
    pub reasons: Vec<String>,
}

impl Outcome for SecondBuyToday {
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
        Some(Signal::SecondBuy(SecondBuy {
            price: self.price?,
            first_buy_level: self.first_buy_level?,
            trigger: self.trigger?,
            pivot: self.pivot,
            score: self.score,
            reasons: Vec::new(),
        }))
    }

    fn rejected(reason: String) -> Self {
        Self {
            found: false,
            trigger: None,
            first_buy_level: None,
            second_buy_level: None,
            price: None,
            pivot: None,
            score: None,
            reasons: vec![reason],
        }
    }
}

/// Full-history second buy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecondBuyAnalysis {
    pub found: bool,
    pub first_buy_level: Option<f64>,
    pub first_buy_index: Option<usize>,
    pub second_buy_level: Option<f64>,
    pub second_buy_index: Option<usize>,
    /// Best-effort pivot after the first buy bar, never blocks the result
    pub pivot: Option<Pivot>,
    pub score: Option<SecondBuyScore>,
    pub reasons: Vec<String>,
}

impl SecondBuyAnalysis {
    fn rejected(reason: String) -> Self {
        Self {
            found: false,
            first_buy_level: None,
            first_buy_index: None,
            second_buy_level: None,
            second_buy_index: None,
            pivot: None,
            score: None,
            reasons: vec![reason],
        }
    }
}

/// Second buy detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondBuyDetector {
    /// Window searched for the proxy first buy level
    pub lookback: Period,
    /// Pullback path: close at most this far above the first buy level
    pub max_rise: Ratio,
    /// Confirms the first buy in the history variant
    pub divergence: DivergenceDetector,
    pub cross: MaCross,
    /// Context pivot after the first buy bar
    pub pivot: PivotDetector,
}

impl Default for SecondBuyDetector {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(30),
            max_rise: Ratio::new_const(0.05),
            divergence: DivergenceDetector::default(),
            cross: MaCross::default(),
            pivot: PivotDetector {
                segment_bars: Period::new_const(5),
                lookback: Period::new_const(50),
            },
        }
    }
}

impl SecondBuyDetector {
    /// Stricter variant: confirmed divergence first, then the lowest later
    /// local low priced above it.
    pub fn detect_history<T: OHLCV>(&self, bars: &[T]) -> SecondBuyAnalysis {
        let divergence = self.divergence.detect(bars);
        let first = match divergence.current {
            Some(first) if divergence.found => first,
            _ => {
                let reason = divergence.reasons.first().map_or("", String::as_str);
                return SecondBuyAnalysis::rejected(format!("no first buy: {reason}"));
            }
        };

        let second = find_extrema(bars)
            .lows
            .into_iter()
            .filter(|low| low.index > first.index && low.price > first.price)
            .min_by(|a, b| a.price.total_cmp(&b.price));

        let Some(second) = second else {
            debug!(first_buy = first.price, "second buy: no later low above the first buy");
            return SecondBuyAnalysis {
                first_buy_level: Some(first.price),
                first_buy_index: Some(first.index),
                ..SecondBuyAnalysis::rejected(
                    "no later local low above the first buy level".to_string(),
                )
            };
        };

        let pivot = self.pivot.find(&bars[first.index + 1..]);
        let close = bars[bars.len() - 1].close();
        let score = SecondBuyScore::compute(first.price, second.price, close, pivot.as_ref());
        trace!(
            first_buy = first.price,
            second_buy = second.price,
            score = score.score,
            "second buy confirmed"
        );

        SecondBuyAnalysis {
            found: true,
            first_buy_level: Some(first.price),
            first_buy_index: Some(first.index),
            second_buy_level: Some(second.price),
            second_buy_index: Some(second.index),
            pivot: pivot.map(|p| p.rounded(PRICE_DECIMALS)),
            score: Some(score),
            reasons: Vec::new(),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        self.cross.validate_config()?;
        self.pivot.validate_config()
    }
}

impl BuyPointDetector for SecondBuyDetector {
    type Check = SecondBuyToday;

    fn kind(&self) -> SignalKind {
        SignalKind::SecondBuy
    }

    fn min_bars(&self) -> usize {
        self.cross.min_bars()
    }

    fn check_today<T: OHLCV>(&self, bars: &[T]) -> SecondBuyToday {
        let Some(last) = bars.last() else {
            return SecondBuyToday::rejected("empty series".to_string());
        };
        let window = tail(bars, self.lookback.get());
        let Some(first) = find_extrema(window).lowest_low().copied() else {
            return SecondBuyToday::rejected("no local low in window".to_string());
        };

        let level = first.price;
        let close = last.close();
        let ceiling = level * (1.0 + self.max_rise.get());
        let mut reasons = Vec::new();

        let pullback = close > level && close <= ceiling;
        if !pullback {
            reasons.push(format!(
                "close {:.4} not within ({:.4}, {:.4}] above the first buy level",
                close, level, ceiling
            ));
        }

        let crossed = self.cross.same_day_golden_cross(bars);
        let cross_above = crossed && close > level;
        if !crossed {
            reasons.push("no same-day golden cross".to_string());
        } else if !cross_above {
            reasons.push(format!(
                "golden cross but close {:.4} <= first buy level {:.4}",
                close, level
            ));
        }

        // a local low is never the last bar, so this is non-empty
        let since_first = &window[first.index + 1..];
        let pullback_low = lowest_low(since_first);
        let held = pullback_low > level;
        if !held {
            reasons.push(format!(
                "pullback low {:.4} <= first buy level {:.4}",
                pullback_low, level
            ));
        }

        let trigger = if !held {
            None
        } else if pullback {
            Some(SecondBuyTrigger::Pullback)
        } else if cross_above {
            Some(SecondBuyTrigger::GoldenCross)
        } else {
            None
        };

        let pivot = self.pivot.find(since_first);
        let score = trigger
            .map(|_| SecondBuyScore::compute(level, pullback_low, close, pivot.as_ref()));
        if trigger.is_some() {
            reasons.clear();
        }

        SecondBuyToday {
            found: trigger.is_some(),
            trigger,
            first_buy_level: Some(round_to(level, PRICE_DECIMALS)),
            second_buy_level: held.then(|| round_to(pullback_low, PRICE_DECIMALS)),
            price: Some(round_to(close, PCT_DECIMALS)),
            pivot: pivot.map(|p| p.rounded(PRICE_DECIMALS)),
            score,
            reasons,
        }
    }

    fn validate_config(&self) -> Result<()> {
        SecondBuyDetector::validate_config(self)
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static SECOND_BUY_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("lookback", 30.0, (20.0, 60.0, 5.0), "Window for the first buy level"),
    ParamMeta::ratio(
        "max_rise",
        0.05,
        (0.02, 0.10, 0.01),
        "Pullback band above the first buy level",
    ),
    ParamMeta::period(
        "divergence_lookback",
        30.0,
        (20.0, 60.0, 5.0),
        "Bars searched for the confirming divergence",
    ),
    ParamMeta::period("segment_bars", 5.0, (4.0, 8.0, 1.0), "Context pivot segment"),
];

impl ParameterizedDetector for SecondBuyDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SECOND_BUY_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            lookback: get_period(params, "lookback", 30)?,
            max_rise: get_ratio(params, "max_rise", 0.05)?,
            divergence: DivergenceDetector {
                lookback: get_period(params, "divergence_lookback", 30)?,
            },
            cross: MaCross::default(),
            pivot: PivotDetector {
                segment_bars: get_period(params, "segment_bars", 5)?,
                lookback: Period::new_const(50),
            },
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "SECOND_BUY"
    }
}
