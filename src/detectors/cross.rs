//! Fast / slow SMA golden cross on closes

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::helpers::sma_closes;
use crate::{
    params::{get_period, ParamMeta, ParameterizedDetector},
    Period, Result, SignalError, OHLCV,
};

/// Bar where the fast average moved above the slow one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cross {
    pub index: usize,
    pub timestamp: Option<i64>,
}

/// Relation of the two averages at a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossState {
    /// fast > slow
    Golden,
    /// fast <= slow
    Death,
    /// Not enough bars for the slow average
    Undefined,
}

/// Both averages aligned with the input bars, `None` during warm-up
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverages {
    pub fast: Vec<Option<f64>>,
    pub slow: Vec<Option<f64>>,
}

impl MovingAverages {
    /// `Some(fast > slow)` once both averages exist at `i`
    fn above(&self, i: usize) -> Option<bool> {
        Some(self.fast.get(i).copied()?? > self.slow.get(i).copied()??)
    }
}

/// Same-day cross over raw averages: fast <= slow one bar ago, fast > slow now.
pub fn is_same_day_cross(fast: &[f64], slow: &[f64]) -> bool {
    match (fast, slow) {
        ([.., f_prev, f_last], [.., s_prev, s_last]) => f_prev <= s_prev && f_last > s_last,
        _ => false,
    }
}

/// Simple moving average cross detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaCross {
    pub fast: Period,
    pub slow: Period,
}

impl Default for MaCross {
    fn default() -> Self {
        Self {
            fast: Period::new_const(5),
            slow: Period::new_const(10),
        }
    }
}

impl MaCross {
    /// Bars past the slow period before a cross is trusted
    pub const WARMUP_BARS: usize = 5;

    pub fn new(fast: usize, slow: usize) -> Result<Self> {
        let cross = Self {
            fast: Period::new(fast)?,
            slow: Period::new(slow)?,
        };
        cross.validate_config()?;
        Ok(cross)
    }

    pub fn validate_config(&self) -> Result<()> {
        if self.fast >= self.slow {
            return Err(SignalError::InvalidConfig(format!(
                "fast period {} must be shorter than slow period {}",
                self.fast.get(),
                self.slow.get()
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn min_bars(&self) -> usize {
        self.slow.get() + Self::WARMUP_BARS
    }

    pub fn averages<T: OHLCV>(&self, bars: &[T]) -> MovingAverages {
        MovingAverages {
            fast: sma_closes(bars, self.fast.get()),
            slow: sma_closes(bars, self.slow.get()),
        }
    }

    /// State at the last bar
    pub fn state<T: OHLCV>(&self, bars: &[T]) -> CrossState {
        let Some(last) = bars.len().checked_sub(1) else {
            return CrossState::Undefined;
        };
        match self.averages(bars).above(last) {
            Some(true) => CrossState::Golden,
            Some(false) => CrossState::Death,
            None => CrossState::Undefined,
        }
    }

    /// Fast above slow at the last bar, with the bar the cross happened on.
    ///
    /// Scans back from the second-to-last bar for the latest bar with
    /// fast <= slow; the cross is the bar after it. When the fast average has
    /// been above since both averages exist, the first such bar is reported.
    pub fn golden_cross<T: OHLCV>(&self, bars: &[T]) -> Option<Cross> {
        let n = bars.len();
        let averages = self.averages(bars);
        if averages.above(n.checked_sub(1)?) != Some(true) {
            return None;
        }

        let mut index = n - 1;
        for i in (0..n - 1).rev() {
            match averages.above(i) {
                Some(true) => index = i,
                Some(false) | None => break,
            }
        }

        trace!(index, bars = n, "golden cross");
        Some(Cross {
            index,
            timestamp: bars[index].timestamp(),
        })
    }

    /// Cross happened exactly on the last bar.
    pub fn same_day_golden_cross<T: OHLCV>(&self, bars: &[T]) -> bool {
        let n = bars.len();
        if n < 2 {
            return false;
        }
        let averages = self.averages(bars);
        matches!(
            (averages.above(n - 2), averages.above(n - 1)),
            (Some(false), Some(true))
        )
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static MA_CROSS_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("fast", 5.0, (3.0, 10.0, 1.0), "Fast SMA period"),
    ParamMeta::period("slow", 10.0, (10.0, 30.0, 5.0), "Slow SMA period"),
];

impl ParameterizedDetector for MaCross {
    fn param_meta() -> &'static [ParamMeta] {
        MA_CROSS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let cross = Self {
            fast: get_period(params, "fast", 5)?,
            slow: get_period(params, "slow", 10)?,
        };
        cross.validate_config()?;
        Ok(cross)
    }

    fn detector_name() -> &'static str {
        "MA_CROSS"
    }
}
