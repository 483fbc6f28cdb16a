//! Divergence strength scoring
//!
//! A 0-100 score from three additive parts:
//!
//! | Part | Max | Rule |
//! |---|---|---|
//! | Price drop | 30 | `floor(drop% * 3)` between the two lowest lows |
//! | Magnitude | 40 | `floor(rise% * 2)` on DIF, else on the MACD histogram, else 5 |
//! | State | 30 | oscillator state at the last bar |

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::extrema::find_extrema;
use super::helpers::{pct_change, round_to, tail, PCT_DECIMALS};
use crate::{
    params::{get_period, ParamMeta, ParameterizedDetector},
    Period, Result, SignalError, OHLCV,
};

pub const MAX_PRICE_DROP_SCORE: u32 = 30;
pub const MAX_MAGNITUDE_SCORE: u32 = 40;
pub const MAX_STATE_SCORE: u32 = 30;

/// Score when neither DIF nor the histogram rose between the lows
pub const MAGNITUDE_FLOOR: u32 = 5;

/// Estimated chance of a rebound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probability {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl Probability {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => Probability::VeryHigh,
            60..=79 => Probability::High,
            40..=59 => Probability::Medium,
            _ => Probability::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Probability::VeryHigh => "very high",
            Probability::High => "high",
            Probability::Medium => "medium",
            Probability::Low => "low",
        }
    }
}

/// Estimated force of a rebound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthLabel {
    Strong,
    Medium,
    Weak,
}

impl StrengthLabel {
    pub fn from_score(score: u32) -> Self {
        match score {
            70.. => StrengthLabel::Strong,
            50..=69 => StrengthLabel::Medium,
            _ => StrengthLabel::Weak,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrengthLabel::Strong => "strong",
            StrengthLabel::Medium => "medium",
            StrengthLabel::Weak => "weak",
        }
    }
}

/// Which series the magnitude part was measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeSource {
    Dif,
    Histogram,
    Floor,
}

/// Scored bottom divergence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DivergenceStrength {
    /// 0..=100
    pub score: u32,
    pub price_drop_score: u32,
    pub magnitude_score: u32,
    pub state_score: u32,
    pub price_drop_pct: f64,
    pub magnitude_pct: f64,
    pub magnitude_source: MagnitudeSource,
    pub probability: Probability,
    pub strength: StrengthLabel,
}

impl DivergenceStrength {
    /// Assemble from sub-scores, each capped at its maximum.
    pub fn from_parts(
        price_drop_score: u32,
        magnitude_score: u32,
        state_score: u32,
        price_drop_pct: f64,
        magnitude_pct: f64,
        magnitude_source: MagnitudeSource,
    ) -> Self {
        let price_drop_score = price_drop_score.min(MAX_PRICE_DROP_SCORE);
        let magnitude_score = magnitude_score.min(MAX_MAGNITUDE_SCORE);
        let state_score = state_score.min(MAX_STATE_SCORE);
        let score = price_drop_score + magnitude_score + state_score;

        Self {
            score,
            price_drop_score,
            magnitude_score,
            state_score,
            price_drop_pct: round_to(price_drop_pct, PCT_DECIMALS),
            magnitude_pct: round_to(magnitude_pct, PCT_DECIMALS),
            magnitude_source,
            probability: Probability::from_score(score),
            strength: StrengthLabel::from_score(score),
        }
    }
}

/// `min(cap, floor(pct * factor))`, 0 for negative or non-finite input
fn scaled(pct: f64, factor: f64, cap: u32) -> u32 {
    let raw = (pct * factor).floor();
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    (raw as u32).min(cap)
}

pub fn price_drop_score(drop_pct: f64) -> u32 {
    scaled(drop_pct, 3.0, MAX_PRICE_DROP_SCORE)
}

pub fn magnitude_score(rise_pct: f64) -> u32 {
    scaled(rise_pct, 2.0, MAX_MAGNITUDE_SCORE)
}

/// Oscillator state at one bar
pub fn state_score(dif: f64, dea: f64, macd: f64) -> u32 {
    if dea < 0.0 && dif > dea {
        30
    } else if dif > dea && macd > 0.0 {
        20
    } else if macd > 0.0 {
        15
    } else {
        5
    }
}

/// Divergence strength scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthScorer {
    /// Most recent bars considered
    pub window: Period,
    /// Trailing bars of `window` searched for the two lows
    pub lookback: Period,
}

impl Default for StrengthScorer {
    fn default() -> Self {
        Self {
            window: Period::new_const(30),
            lookback: Period::new_const(20),
        }
    }
}

impl StrengthScorer {
    pub fn new(window: usize, lookback: usize) -> Result<Self> {
        let scorer = Self {
            window: Period::new(window)?,
            lookback: Period::new(lookback)?,
        };
        scorer.validate_config()?;
        Ok(scorer)
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.lookback > self.window {
            return Err(SignalError::InvalidConfig(format!(
                "strength lookback {} exceeds window {}",
                self.lookback.get(),
                self.window.get()
            )));
        }
        Ok(())
    }

    /// Score the divergence between the two lowest local lows, `None` when
    /// there are fewer than two.
    pub fn score<T: OHLCV>(&self, bars: &[T]) -> Option<DivergenceStrength> {
        let scan = tail(tail(bars, self.window.get()), self.lookback.get());
        let lows = find_extrema(scan).lows_by_price();
        let [current, previous, ..] = lows.as_slice() else {
            debug!(lows = lows.len(), "strength: not enough local lows");
            return None;
        };

        let drop_pct = -pct_change(previous.price, current.price);

        let dif_rise = match (current.dif, previous.dif) {
            (Some(cur), Some(prev)) if cur > prev => Some(pct_change(prev, cur)),
            _ => None,
        };
        let histogram_rise = match (scan[current.index].macd(), scan[previous.index].macd()) {
            (Some(cur), Some(prev)) if cur > prev => Some(pct_change(prev, cur)),
            _ => None,
        };
        let (magnitude, magnitude_pct, source) = match (dif_rise, histogram_rise) {
            (Some(pct), _) => (magnitude_score(pct), pct, MagnitudeSource::Dif),
            (None, Some(pct)) => (magnitude_score(pct), pct, MagnitudeSource::Histogram),
            (None, None) => (MAGNITUDE_FLOOR, 0.0, MagnitudeSource::Floor),
        };

        let state = scan
            .last()
            .and_then(|b| Some(state_score(b.dif()?, b.dea()?, b.macd()?)))
            .unwrap_or(5);

        let strength = DivergenceStrength::from_parts(
            price_drop_score(drop_pct),
            magnitude,
            state,
            drop_pct,
            magnitude_pct,
            source,
        );
        trace!(
            score = strength.score,
            probability = strength.probability.as_str(),
            "divergence strength"
        );
        Some(strength)
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static STRENGTH_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("window", 30.0, (20.0, 60.0, 5.0), "Most recent bars considered"),
    ParamMeta::period(
        "lookback",
        20.0,
        (10.0, 30.0, 2.0),
        "Trailing bars searched for the two lows",
    ),
];

impl ParameterizedDetector for StrengthScorer {
    fn param_meta() -> &'static [ParamMeta] {
        STRENGTH_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let scorer = Self {
            window: get_period(params, "window", 30)?,
            lookback: get_period(params, "lookback", 20)?,
        };
        scorer.validate_config()?;
        Ok(scorer)
    }

    fn detector_name() -> &'static str {
        "STRENGTH"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    /// 30 flat bars, lows 100 (DIF 2.0) at 14 and 95 (DIF 3.5) at 27
    fn diverging() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..30)
            .map(|i| {
                Bar::new(110.0, 111.0, 109.0, 110.0, 1.0)
                    .at(i)
                    .with_oscillator(0.0, 0.0, 0.0)
            })
            .collect();
        bars[14].low = 100.0;
        bars[14].dif = Some(2.0);
        bars[27].low = 95.0;
        bars[27].dif = Some(3.5);
        bars[29] = bars[29].with_oscillator(-0.2, -0.5, 0.6);
        bars
    }

    #[test]
    fn test_bands() {
        assert_eq!(Probability::from_score(85), Probability::VeryHigh);
        assert_eq!(StrengthLabel::from_score(85), StrengthLabel::Strong);
        assert_eq!(Probability::from_score(45), Probability::Medium);
        assert_eq!(StrengthLabel::from_score(45), StrengthLabel::Weak);
        assert_eq!(Probability::from_score(60).as_str(), "high");
        assert_eq!(StrengthLabel::from_score(50).as_str(), "medium");
        assert_eq!(Probability::from_score(0), Probability::Low);
    }

    #[test]
    fn test_sub_scores() {
        assert_eq!(price_drop_score(5.0), 15);
        assert_eq!(price_drop_score(12.0), 30);
        assert_eq!(price_drop_score(-1.0), 0);
        assert_eq!(magnitude_score(75.0), 40);
        assert_eq!(magnitude_score(7.9), 15);
        assert_eq!(state_score(-0.2, -0.5, 0.6), 30);
        assert_eq!(state_score(0.5, 0.2, 0.6), 20);
        assert_eq!(state_score(0.1, 0.2, 0.6), 15);
        assert_eq!(state_score(0.1, 0.2, -0.2), 5);
    }

    #[test]
    fn test_from_parts_caps() {
        let s = DivergenceStrength::from_parts(99, 99, 99, 0.0, 0.0, MagnitudeSource::Dif);
        assert_eq!(s.score, 100);
        let s = DivergenceStrength::from_parts(15, 25, 5, 5.0, 12.5, MagnitudeSource::Dif);
        assert_eq!(s.score, 45);
        assert_eq!(s.probability, Probability::Medium);
        assert_eq!(s.strength, StrengthLabel::Weak);
    }

    #[test]
    fn test_score_divergence() {
        let strength = StrengthScorer::with_defaults().score(&diverging()).unwrap();
        assert_eq!(strength.price_drop_score, 15);
        assert_eq!(strength.magnitude_score, 40);
        assert_eq!(strength.magnitude_source, MagnitudeSource::Dif);
        assert_eq!(strength.state_score, 30);
        assert_eq!(strength.score, 85);
        assert_eq!(strength.probability, Probability::VeryHigh);
        assert_eq!(strength.strength, StrengthLabel::Strong);
        assert_eq!(strength.price_drop_pct, 5.0);
        assert_eq!(strength.magnitude_pct, 75.0);
    }

    #[test]
    fn test_histogram_fallback() {
        let mut bars = diverging();
        bars[27].dif = Some(1.0);
        bars[14].macd = Some(0.5);
        bars[27].macd = Some(1.0);
        let strength = StrengthScorer::with_defaults().score(&bars).unwrap();
        assert_eq!(strength.magnitude_source, MagnitudeSource::Histogram);
        assert_eq!(strength.magnitude_pct, 100.0);
        assert_eq!(strength.magnitude_score, 40);
    }

    #[test]
    fn test_floor_and_zero_baseline() {
        let mut bars = diverging();
        bars[27].dif = Some(1.0);
        let strength = StrengthScorer::with_defaults().score(&bars).unwrap();
        assert_eq!(strength.magnitude_source, MagnitudeSource::Floor);
        assert_eq!(strength.magnitude_score, MAGNITUDE_FLOOR);

        // DIF rises from zero: 0% magnitude, not infinity
        let mut bars = diverging();
        bars[14].dif = Some(0.0);
        let strength = StrengthScorer::with_defaults().score(&bars).unwrap();
        assert_eq!(strength.magnitude_source, MagnitudeSource::Dif);
        assert_eq!(strength.magnitude_score, 0);
    }

    #[test]
    fn test_lows_outside_lookback_ignored() {
        // bar 8 is outside the trailing 20 bars
        let mut bars = diverging();
        bars[14].low = 109.0;
        bars[8].low = 100.0;
        assert!(StrengthScorer::with_defaults().score(&bars).is_none());
    }

    #[test]
    fn test_config_validation() {
        assert!(StrengthScorer::new(30, 20).is_ok());
        assert!(StrengthScorer::new(20, 30).is_err());
    }
}
