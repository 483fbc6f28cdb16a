//! MACD columns (DIF / DEA / histogram) for bar series
//!
//! The EMA is seeded with the first value and updated recursively with
//! `alpha = 2 / (span + 1)` from the second value on, so every output
//! position is defined. Histogram is `2 * (dif - dea)`.

use serde::{Deserialize, Serialize};

use crate::{Bar, Period, Result, SignalError};

/// MACD periods
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: Period,
    pub slow: Period,
    pub signal: Period,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: Period::new_const(12),
            slow: Period::new_const(26),
            signal: Period::new_const(9),
        }
    }
}

impl MacdParams {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Result<Self> {
        let params = Self {
            fast: Period::new(fast)?,
            slow: Period::new(slow)?,
            signal: Period::new(signal)?,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fast >= self.slow {
            return Err(SignalError::InvalidConfig(format!(
                "MACD fast period {} must be shorter than slow period {}",
                self.fast.get(),
                self.slow.get()
            )));
        }
        Ok(())
    }
}

/// Recursive EMA seeded with the first value.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut iter = values.iter();

    if let Some(&first) = iter.next() {
        let mut prev = first;
        out.push(prev);
        for &value in iter {
            prev = alpha * value + (1.0 - alpha) * prev;
            out.push(prev);
        }
    }

    out
}

/// DIF, DEA and histogram, aligned with the input
#[derive(Debug, Clone, PartialEq)]
pub struct MacdColumns {
    pub dif: Vec<f64>,
    pub dea: Vec<f64>,
    pub macd: Vec<f64>,
}

pub fn macd_columns(closes: &[f64], params: &MacdParams) -> MacdColumns {
    let fast = ema(closes, params.fast.get());
    let slow = ema(closes, params.slow.get());
    let dif: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let dea = ema(&dif, params.signal.get());
    let macd = dif.iter().zip(&dea).map(|(d, e)| 2.0 * (d - e)).collect();
    MacdColumns { dif, dea, macd }
}

/// Fill the oscillator columns of `bars` from their closes.
pub fn with_macd(mut bars: Vec<Bar>, params: &MacdParams) -> Vec<Bar> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let columns = macd_columns(&closes, params);
    for (i, bar) in bars.iter_mut().enumerate() {
        bar.dif = Some(columns.dif[i]);
        bar.dea = Some(columns.dea[i]);
        bar.macd = Some(columns.macd[i]);
    }
    bars
}
