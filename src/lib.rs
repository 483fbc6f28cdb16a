//! # buypoint - pivot-range buy point detection
//!
//! Detects three classes of buy point over OHLCV series that carry MACD columns:
//!
//! - **First buy**: bottom divergence between price lows and DIF.
//! - **Second buy**: a pullback that holds just above the first buy level.
//! - **Third buy**: a breakout above a consolidation pivot whose pullback stays above ZG.
//!
//! ## Quick Start
//!
//! ```rust
//! use buypoint::prelude::*;
//!
//! // Any ascending series; oscillator columns can come from the caller or `with_macd`
//! let bars: Vec<Bar> = (0..60)
//!     .map(|i| {
//!         let c = 10.0 + (i as f64 * 0.3).sin();
//!         Bar::new(c, c + 0.2, c - 0.2, c, 1000.0).at(i as i64)
//!     })
//!     .collect();
//! let bars = with_macd(bars, &MacdParams::default());
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let analysis = engine.analyze_today(&bars);
//! if let Some(signal) = &analysis.signal {
//!     println!("{} at {:.2}", signal.kind().as_str(), signal.price());
//! }
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub mod detectors;
pub mod oscillator;
pub mod params;

pub mod prelude {
    pub use crate::{
        // Detectors
        detectors::*,
        // Oscillator columns
        oscillator::{ema, macd_columns, with_macd, MacdColumns, MacdParams},
        // Parameters
        params::{get_period, get_price, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Ranking / parallel
        rank_signals,
        scan_parallel,
        // Data model
        Bar,
        // Core traits
        BuyPointDetector,
        // Engine
        BuyPointEngine,
        EngineBuilder,
        EngineConfig,
        HistoryAnalysis,
        InstrumentReport,
        Level,
        LevelReport,
        LevelVerdict,
        OHLCVExt,
        Outcome,
        Period,
        RankedSignal,
        Ratio,
        Result,
        ScanError,
        Signal,
        // Errors
        SignalError,
        SignalKind,
        TodayAnalysis,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors raised by configuration and opt-in input validation.
///
/// Detectors themselves never fail: unmet preconditions come back as a
/// negative outcome with reasons.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Unknown level: {0}")]
    UnknownLevel(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(SignalError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(SignalError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period in bars (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SignalError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core bar trait.
///
/// Oscillator accessors default to `None`; a series without MACD columns is
/// still a valid input and divergence checks report the missing columns.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }

    /// Fast EMA minus slow EMA
    fn dif(&self) -> Option<f64> {
        None
    }

    /// Signal line (EMA of DIF)
    fn dea(&self) -> Option<f64> {
        None
    }

    /// Histogram, `2 * (dif - dea)`
    fn macd(&self) -> Option<f64> {
        None
    }
}

/// Extension trait with checks over a single bar
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn has_oscillator(&self) -> bool {
        self.dif().is_some() && self.dea().is_some() && self.macd().is_some()
    }

    /// Validate price consistency of a single bar
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(SignalError::InvalidBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(SignalError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(SignalError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Owned bar with optional MACD columns
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bar {
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub dif: Option<f64>,
    #[serde(default)]
    pub dea: Option<f64>,
    #[serde(default)]
    pub macd: Option<f64>,
}

impl Bar {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            ..Self::default()
        }
    }

    /// Set the timestamp
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set DIF / DEA / MACD columns
    pub fn with_oscillator(mut self, dif: f64, dea: f64, macd: f64) -> Self {
        self.dif = Some(dif);
        self.dea = Some(dea);
        self.macd = Some(macd);
        self
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    fn dif(&self) -> Option<f64> {
        self.dif
    }

    fn dea(&self) -> Option<f64> {
        self.dea
    }

    fn macd(&self) -> Option<f64> {
        self.macd
    }
}

// ============================================================
// LEVELS
// ============================================================

/// Bar granularity a series was sampled at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "60")]
    Min60,
    #[serde(rename = "30")]
    Min30,
    #[serde(rename = "15")]
    Min15,
    #[serde(rename = "5")]
    Min5,
    #[serde(rename = "1")]
    Min1,
}

impl Level {
    /// Levels scanned when the caller does not choose
    pub const DEFAULT_SCAN: [Level; 5] = [
        Level::Daily,
        Level::Min60,
        Level::Min30,
        Level::Min15,
        Level::Min5,
    ];

    /// Stable code used by data sources ("daily", "60", ...)
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Daily => "daily",
            Level::Min60 => "60",
            Level::Min30 => "30",
            Level::Min15 => "15",
            Level::Min5 => "5",
            Level::Min1 => "1",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Level::Daily => "daily",
            Level::Min60 => "60-minute",
            Level::Min30 => "30-minute",
            Level::Min15 => "15-minute",
            Level::Min5 => "5-minute",
            Level::Min1 => "1-minute",
        }
    }

    #[inline]
    pub fn is_intraday(self) -> bool {
        !matches!(self, Level::Daily)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Level {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "daily" | "d" | "1d" => Ok(Level::Daily),
            "60" => Ok(Level::Min60),
            "30" => Ok(Level::Min30),
            "15" => Ok(Level::Min15),
            "5" => Ok(Level::Min5),
            "1" => Ok(Level::Min1),
            other => Err(SignalError::UnknownLevel(other.to_string())),
        }
    }
}

// ============================================================
// SIGNALS
// ============================================================

/// Buy point class, later stages take precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    FirstBuy,
    SecondBuy,
    ThirdBuy,
}

impl SignalKind {
    /// Higher wins when several kinds trigger on the same series
    #[inline]
    pub fn priority(self) -> u8 {
        match self {
            SignalKind::FirstBuy => 1,
            SignalKind::SecondBuy => 2,
            SignalKind::ThirdBuy => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::FirstBuy => "first_buy",
            SignalKind::SecondBuy => "second_buy",
            SignalKind::ThirdBuy => "third_buy",
        }
    }
}

/// A detected buy point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    FirstBuy(FirstBuy),
    SecondBuy(SecondBuy),
    ThirdBuy(ThirdBuy),
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::FirstBuy(_) => SignalKind::FirstBuy,
            Signal::SecondBuy(_) => SignalKind::SecondBuy,
            Signal::ThirdBuy(_) => SignalKind::ThirdBuy,
        }
    }

    /// Trigger price
    pub fn price(&self) -> f64 {
        match self {
            Signal::FirstBuy(s) => s.price,
            Signal::SecondBuy(s) => s.price,
            Signal::ThirdBuy(s) => s.price,
        }
    }

    pub fn pivot(&self) -> Option<Pivot> {
        match self {
            Signal::FirstBuy(_) => None,
            Signal::SecondBuy(s) => s.pivot,
            Signal::ThirdBuy(s) => Some(s.pivot),
        }
    }

    /// Justifications, empty when every condition held
    pub fn reasons(&self) -> &[String] {
        match self {
            Signal::FirstBuy(s) => &s.reasons,
            Signal::SecondBuy(s) => &s.reasons,
            Signal::ThirdBuy(s) => &s.reasons,
        }
    }

    /// Ranking score within a kind: divergence strength for first buys,
    /// the composite score for second buys, 0 for third buys.
    pub fn score(&self) -> f64 {
        match self {
            Signal::FirstBuy(s) => s.strength.map_or(0.0, |st| f64::from(st.score)),
            Signal::SecondBuy(s) => s.score.map_or(0.0, |sc| sc.score),
            Signal::ThirdBuy(_) => 0.0,
        }
    }
}

// ============================================================
// DETECTOR TRAITS
// ============================================================

/// Result of a single buy point check
pub trait Outcome {
    fn passed(&self) -> bool;

    /// Failing conditions, empty on success
    fn reasons(&self) -> &[String];

    /// The signal to report, `None` unless the check passed
    fn to_signal(&self) -> Option<Signal>;

    /// A failed check carrying a single reason
    fn rejected(reason: String) -> Self
    where
        Self: Sized;
}

/// A same-day buy point detector
pub trait BuyPointDetector: Send + Sync {
    type Check: Outcome;

    fn kind(&self) -> SignalKind;

    /// Shorter series are rejected without running the check
    fn min_bars(&self) -> usize;

    /// Evaluate the most recent bar of `bars`
    fn check_today<T: OHLCV>(&self, bars: &[T]) -> Self::Check;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

fn run_check<D: BuyPointDetector, T: OHLCV>(detector: &D, bars: &[T]) -> D::Check {
    let need = detector.min_bars();
    if bars.len() < need {
        debug!(
            kind = detector.kind().as_str(),
            bars = bars.len(),
            need,
            "buy point skipped: not enough bars"
        );
        return D::Check::rejected(format!(
            "not enough bars (len={}, need {need})",
            bars.len()
        ));
    }

    let check = detector.check_today(bars);
    if check.passed() {
        trace!(kind = detector.kind().as_str(), bars = bars.len(), "buy point triggered");
    } else {
        debug!(
            kind = detector.kind().as_str(),
            bars = bars.len(),
            reasons = ?check.reasons(),
            "buy point not triggered"
        );
    }
    check
}

// ============================================================
// BUY POINT ENGINE
// ============================================================

use detectors::*;

/// Engine configuration, loadable from any serde format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject NaN / inconsistent bars and non-ascending timestamps
    pub validate_data: bool,
    /// Levels with fewer bars are skipped
    pub min_level_bars: usize,
    /// Drop first buys whose divergence strength scores below this
    pub min_first_buy_score: Option<u32>,
    pub third_buy: ThirdBuyDetector,
    pub second_buy: SecondBuyDetector,
    pub first_buy: FirstBuyDetector,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_data: false,
            min_level_bars: DETAIL_MIN_BARS,
            min_first_buy_score: None,
            third_buy: ThirdBuyDetector::default(),
            second_buy: SecondBuyDetector::default(),
            first_buy: FirstBuyDetector::default(),
        }
    }
}

/// All three same-day checks plus the signal that wins precedence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayAnalysis {
    pub third: ThirdBuyToday,
    pub second: SecondBuyToday,
    pub first: FirstBuyToday,
    /// ThirdBuy suppresses SecondBuy, which suppresses FirstBuy
    pub signal: Option<Signal>,
}

impl TodayAnalysis {
    pub fn resolve(
        third: ThirdBuyToday,
        second: SecondBuyToday,
        first: FirstBuyToday,
        min_first_buy_score: Option<u32>,
    ) -> Self {
        let signal = third
            .to_signal()
            .or_else(|| second.to_signal())
            .or_else(|| {
                first.to_signal().filter(|_| match min_first_buy_score {
                    Some(min) => first.strength.is_some_and(|s| s.score >= min),
                    None => true,
                })
            });

        Self {
            third,
            second,
            first,
            signal,
        }
    }
}

/// Full-history view: base divergence, stricter second buy and third buy detail
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryAnalysis {
    pub divergence: Divergence,
    pub strength: Option<DivergenceStrength>,
    pub second_buy: SecondBuyAnalysis,
    pub third_buy: ThirdBuyDetail,
}

/// Third buy verdict for one level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelVerdict {
    pub level: Level,
    pub detail: ThirdBuyDetail,
}

impl LevelVerdict {
    #[inline]
    pub fn passed(&self) -> bool {
        self.detail.passed
    }
}

/// Same-day analysis of one level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
    pub level: Level,
    pub bars: usize,
    pub analysis: TodayAnalysis,
}

/// Signal tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSignal {
    pub symbol: String,
    pub level: Level,
    pub signal: Signal,
}

/// Per-instrument merge of all analysed levels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentReport {
    pub symbol: String,
    pub levels: Vec<LevelReport>,
    /// Ordered by [`rank_signals`]
    pub signals: Vec<RankedSignal>,
}

impl InstrumentReport {
    /// Highest ranked signal across levels
    pub fn best(&self) -> Option<&RankedSignal> {
        self.signals.first()
    }
}

/// Main buy point engine
#[derive(Debug, Clone)]
pub struct BuyPointEngine {
    config: EngineConfig,
}

impl BuyPointEngine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ===========================================
    // SINGLE SERIES
    // ===========================================

    /// Same-day analysis with the configured detectors as-is.
    pub fn analyze_today<T: OHLCV>(&self, bars: &[T]) -> TodayAnalysis {
        self.analyze_with(&self.config.third_buy, bars)
    }

    /// Same-day analysis with the third buy pivot tuned for `level`.
    pub fn analyze_level<T: OHLCV>(&self, level: Level, bars: &[T]) -> TodayAnalysis {
        let third = self.config.third_buy.for_level(level, bars.len());
        self.analyze_with(&third, bars)
    }

    /// Historical (confirmed) variants of every detector.
    pub fn analyze_history<T: OHLCV>(&self, bars: &[T]) -> HistoryAnalysis {
        let divergence = self.config.first_buy.divergence.detect(bars);
        let strength = divergence
            .found
            .then(|| self.config.first_buy.strength.score(bars))
            .flatten();

        HistoryAnalysis {
            divergence,
            strength,
            second_buy: self.config.second_buy.detect_history(bars),
            third_buy: self.config.third_buy.detail(bars),
        }
    }

    // ===========================================
    // MULTI-LEVEL
    // ===========================================

    /// Run the detailed third buy check per level, independently.
    pub fn third_buy_levels<T: OHLCV>(&self, series: &[(Level, &[T])]) -> Vec<LevelVerdict> {
        series
            .iter()
            .map(|&(level, bars)| {
                let detail = if bars.len() < self.config.min_level_bars {
                    ThirdBuyDetail::rejected(format!(
                        "no data or too few bars (len={})",
                        bars.len()
                    ))
                } else {
                    self.config.third_buy.for_level(level, bars.len()).detail(bars)
                };
                LevelVerdict { level, detail }
            })
            .collect()
    }

    /// Levels whose third buy check passes.
    pub fn hit_levels<T: OHLCV>(&self, series: &[(Level, &[T])]) -> Vec<Level> {
        self.third_buy_levels(series)
            .into_iter()
            .filter(LevelVerdict::passed)
            .map(|v| v.level)
            .collect()
    }

    /// Same-day analysis of every level of one instrument, signals ranked.
    pub fn analyze_instrument<T: OHLCV>(
        &self,
        symbol: &str,
        series: &[(Level, &[T])],
    ) -> Result<InstrumentReport> {
        if self.config.validate_data {
            for &(_, bars) in series {
                self.validate_bars(bars)?;
            }
        }

        let mut levels = Vec::with_capacity(series.len());
        let mut signals = Vec::new();

        for &(level, bars) in series {
            if bars.len() < self.config.min_level_bars {
                debug!(
                    symbol,
                    level = level.as_str(),
                    bars = bars.len(),
                    "level skipped: too few bars"
                );
                continue;
            }

            let analysis = self.analyze_level(level, bars);
            if let Some(signal) = &analysis.signal {
                signals.push(RankedSignal {
                    symbol: symbol.to_string(),
                    level,
                    signal: signal.clone(),
                });
            }
            levels.push(LevelReport {
                level,
                bars: bars.len(),
                analysis,
            });
        }

        rank_signals(&mut signals);

        Ok(InstrumentReport {
            symbol: symbol.to_string(),
            levels,
            signals,
        })
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn analyze_with<T: OHLCV>(&self, third: &ThirdBuyDetector, bars: &[T]) -> TodayAnalysis {
        TodayAnalysis::resolve(
            run_check(third, bars),
            run_check(&self.config.second_buy, bars),
            run_check(&self.config.first_buy, bars),
            self.config.min_first_buy_score,
        )
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        let mut last_ts: Option<i64> = None;
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                SignalError::InvalidBar { reason, .. } => {
                    SignalError::InvalidBar { index: i, reason }
                }
                other => other,
            })?;
            if let Some(ts) = bar.timestamp() {
                if last_ts.is_some_and(|prev| ts <= prev) {
                    return Err(SignalError::InvalidBar {
                        index: i,
                        reason: "timestamps not strictly ascending",
                    });
                }
                last_ts = Some(ts);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.config.min_level_bars < DETAIL_MIN_BARS {
            return Err(SignalError::InvalidConfig(format!(
                "min_level_bars must be >= {DETAIL_MIN_BARS}, got {}",
                self.config.min_level_bars
            )));
        }
        self.config.third_buy.validate_config()?;
        self.config.second_buy.validate_config()?;
        self.config.first_buy.validate_config()?;
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating BuyPointEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a full configuration, e.g. one deserialized from a file
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn third_buy(mut self, detector: ThirdBuyDetector) -> Self {
        self.config.third_buy = detector;
        self
    }

    pub fn second_buy(mut self, detector: SecondBuyDetector) -> Self {
        self.config.second_buy = detector;
        self
    }

    pub fn first_buy(mut self, detector: FirstBuyDetector) -> Self {
        self.config.first_buy = detector;
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    pub fn min_level_bars(mut self, bars: usize) -> Self {
        self.config.min_level_bars = bars;
        self
    }

    /// Set minimum divergence strength for reported first buys
    pub fn min_first_buy_score(mut self, score: u32) -> Self {
        self.config.min_first_buy_score = Some(score);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<BuyPointEngine> {
        let engine = BuyPointEngine {
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// RANKING & PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Order signals: third buys first, then second, then first; within a kind by score, descending.
pub fn rank_signals(signals: &mut [RankedSignal]) {
    signals.sort_by(|a, b| {
        b.signal
            .kind()
            .priority()
            .cmp(&a.signal.kind().priority())
            .then_with(|| b.signal.score().total_cmp(&a.signal.score()))
    });
}

/// Error from analysing a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: SignalError,
}

/// Parallel analysis of multiple instruments, each with its own levels
pub fn scan_parallel<'a, T, I>(
    engine: &BuyPointEngine,
    instruments: I,
) -> (Vec<InstrumentReport>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [(Level, &'a [T])])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, series)| {
            engine
                .analyze_instrument(symbol, series)
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
