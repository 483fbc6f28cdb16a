//! Same-day first buy
//!
//! Triggers on either of:
//!
//! - a fresh bottom divergence: the two most recent local lows diverge and
//!   the later one sits within the last `recent_bars` bars of the window;
//! - a golden cross on the last bar.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::cross::MaCross;
use super::divergence::{compare_lows, DivergenceDetector, DivergenceFailure};
use super::extrema::find_extrema;
use super::helpers::{round_to, tail, PCT_DECIMALS};
use super::strength::{DivergenceStrength, StrengthScorer};
use crate::{
    params::{get_period, ParamMeta, ParameterizedDetector},
    BuyPointDetector, Outcome, Period, Result, Signal, SignalKind, OHLCV,
};

/// Same-day first buy check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstBuyToday {
    pub found: bool,
    pub divergence_today: bool,
    pub golden_cross: bool,
    /// New low on the divergence path, last close on the cross path
    pub price: Option<f64>,
    /// Scored only when the divergence path fired
    pub strength: Option<DivergenceStrength>,
    pub reasons: Vec<String>,
}

/// Reported first buy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirstBuy {
    pub price: f64,
    pub divergence: bool,
    pub golden_cross: bool,
    pub strength: Option<DivergenceStrength>,
    pub reasons: Vec<String>,
}

impl Outcome for FirstBuyToday {
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
        Some(Signal::FirstBuy(FirstBuy {
            price: self.price?,
            divergence: self.divergence_today,
            golden_cross: self.golden_cross,
            strength: self.strength,
            reasons: Vec::new(),
        }))
    }

    fn rejected(reason: String) -> Self {
        Self {
            found: false,
            divergence_today: false,
            golden_cross: false,
            price: None,
            strength: None,
            reasons: vec![reason],
        }
    }
}

/// Divergence or golden cross on the most recent bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstBuyDetector {
    pub divergence: DivergenceDetector,
    pub cross: MaCross,
    pub strength: StrengthScorer,
    /// The later low must lie within this many most recent bars
    pub recent_bars: Period,
}

impl Default for FirstBuyDetector {
    fn default() -> Self {
        Self {
            divergence: DivergenceDetector::default(),
            cross: MaCross::default(),
            strength: StrengthScorer::default(),
            recent_bars: Period::new_const(3),
        }
    }
}

impl FirstBuyDetector {
    /// Fresh divergence between the two most recent lows; `Ok(new low)` or the reason it failed.
    fn fresh_divergence<T: OHLCV>(&self, bars: &[T]) -> std::result::Result<f64, String> {
        let window = tail(bars, self.divergence.lookback.get());
        let extrema = find_extrema(window);
        let Some((previous, latest)) = extrema.last_two_lows() else {
            return Err(DivergenceFailure::NotEnoughLows.reason().to_string());
        };

        let age = window.len() - 1 - latest.index;
        if age >= self.recent_bars.get() {
            return Err(format!("latest local low is {age} bars old"));
        }
        compare_lows(latest, previous)
            .map(|()| latest.price)
            .map_err(|failure| failure.reason().to_string())
    }
}

impl BuyPointDetector for FirstBuyDetector {
    type Check = FirstBuyToday;

    fn kind(&self) -> SignalKind {
        SignalKind::FirstBuy
    }

    fn min_bars(&self) -> usize {
        self.cross.min_bars()
    }

    fn check_today<T: OHLCV>(&self, bars: &[T]) -> FirstBuyToday {
        let Some(last) = bars.last() else {
            return FirstBuyToday::rejected("empty series".to_string());
        };

        let mut reasons = Vec::new();

        let divergence = self.fresh_divergence(bars);
        let divergence_today = divergence.is_ok();
        if let Err(reason) = &divergence {
            reasons.push(reason.clone());
        }

        let golden_cross = self.cross.same_day_golden_cross(bars);
        if !golden_cross {
            reasons.push("no same-day golden cross".to_string());
        }

        let found = divergence_today || golden_cross;
        let price = match divergence {
            Ok(low) => Some(low),
            Err(_) => golden_cross.then(|| last.close()),
        };
        if found {
            reasons.clear();
        }

        FirstBuyToday {
            found,
            divergence_today,
            golden_cross,
            price: price.map(|p| round_to(p, PCT_DECIMALS)),
            strength: if divergence_today {
                self.strength.score(bars)
            } else {
                None
            },
            reasons,
        }
    }

    fn validate_config(&self) -> Result<()> {
        self.cross.validate_config()?;
        self.strength.validate_config()
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static FIRST_BUY_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("lookback", 30.0, (20.0, 60.0, 5.0), "Bars searched for local lows"),
    ParamMeta::period("recent_bars", 3.0, (2.0, 5.0, 1.0), "Freshness of the later low"),
    ParamMeta::period("fast", 5.0, (3.0, 10.0, 1.0), "Fast SMA period"),
    ParamMeta::period("slow", 10.0, (10.0, 30.0, 5.0), "Slow SMA period"),
];

impl ParameterizedDetector for FirstBuyDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FIRST_BUY_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let detector = Self {
            divergence: DivergenceDetector {
                lookback: get_period(params, "lookback", 30)?,
            },
            cross: MaCross {
                fast: get_period(params, "fast", 5)?,
                slow: get_period(params, "slow", 10)?,
            },
            strength: StrengthScorer::default(),
            recent_bars: get_period(params, "recent_bars", 3)?,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn detector_name() -> &'static str {
        "FIRST_BUY"
    }
}
