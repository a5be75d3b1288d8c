//! # tradescan - chart-pattern trade screener
//!
//! Screens a universe of symbols for chart patterns, proposes long-only
//! entry/stop/target levels and ranks the candidates by risk/reward.
//!
//! ## Quick Start
//!
//! ```rust
//! use tradescan::prelude::*;
//!
//! // Closes from any source, oldest first
//! let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
//!
//! // Registry with the full named catalog
//! let registry = RegistryBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! for result in registry.detect_all(&closes) {
//!     if let Some(levels) = result.levels {
//!         println!("{}: R:R {:.2}", result.pattern_id, risk_reward(&levels).unwrap());
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod detectors;
pub mod indicators;
pub mod logging;
pub mod narrative;
pub mod provider;
pub mod screener;

pub mod prelude {
    pub use crate::{
        // Providers
        cache::{CacheConfig, CachedProvider},
        // Config
        config::ScreenerConfig,
        // Detectors
        detectors::*,
        // Indicators
        indicators::{AnnotatedSeries, Bands, BollingerParams, IndicatorSet, IndicatorSnapshot},
        narrative::{AnalysisEntry, AnalysisLog, NarrativeProvider},
        provider::{InMemoryProvider, MarketDataProvider, ProviderError, RetryPolicy, RetryingProvider},
        // Core
        risk_reward,
        // Screener
        screener::{CancellationToken, ScanReport, Screener, SkippedSymbol, TradeSetup},
        BuiltinDetector,
        DetectorKind,
        Interval,
        Multiplier,
        PatternDetector,
        PatternId,
        PatternRegistry,
        PatternResult,
        Period,
        PricePoint,
        RegistryBuilder,
        Result,
        ScreenError,
        Series,
        TradeLevels,
    };
}

use std::fmt;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ScreenError>;

/// Errors that can occur while screening
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScreenError {
    #[error("Insufficient data: need {need} points, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("No data for {symbol}")]
    NoData { symbol: String },

    #[error("Invalid symbol: {symbol}")]
    InvalidSymbol { symbol: String },

    #[error("Rate limited while fetching {symbol}")]
    RateLimited { symbol: String },

    #[error("Risk/reward undefined: entry equals stop loss")]
    DivisionUndefined,

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),

    #[error("Timestamps not strictly increasing at index {index}")]
    UnorderedTimestamps { index: usize },

    #[error("Invalid price at index {index}: {reason}")]
    InvalidPrice { index: usize, reason: &'static str },

    #[error("Provider error: {0}")]
    Provider(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Window length or span (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ScreenError::InvalidValue("Period must be > 0"));
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

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

/// Positive, finite scale factor (e.g. Bollinger band width `k`)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Multiplier(f64);

impl Multiplier {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(ScreenError::InvalidValue(
                "Multiplier cannot be NaN or infinite",
            ));
        }
        if value <= 0.0 {
            return Err(ScreenError::InvalidValue("Multiplier must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Multiplier {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Multiplier {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Multiplier::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PRICE DATA
// ============================================================

/// One bar of price history. Only `close` is required.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    /// Bar start, unix milliseconds
    pub timestamp: i64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
}

impl PricePoint {
    pub fn new(timestamp: i64, close: f64) -> Self {
        Self {
            timestamp,
            close,
            open: None,
            high: None,
            low: None,
        }
    }

    pub fn with_ohlc(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            close,
            open: Some(open),
            high: Some(high),
            low: Some(low),
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        if !self.close.is_finite() {
            return Err(ScreenError::InvalidPrice {
                index,
                reason: "close is NaN or infinite",
            });
        }
        let optional = [self.open, self.high, self.low];
        if optional.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ScreenError::InvalidPrice {
                index,
                reason: "NaN or infinite value in OHLC",
            });
        }
        if let (Some(high), Some(low)) = (self.high, self.low) {
            if high < low {
                return Err(ScreenError::InvalidPrice {
                    index,
                    reason: "high < low",
                });
            }
        }
        Ok(())
    }
}

/// Time-ordered price history. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Series {
    points: Vec<PricePoint>,
}

impl Series {
    /// Build a series, validating strictly increasing timestamps and finite prices.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for (i, point) in points.iter().enumerate() {
            point.validate(i)?;
            if i > 0 && point.timestamp <= points[i - 1].timestamp {
                return Err(ScreenError::UnorderedTimestamps { index: i });
            }
        }
        Ok(Self { points })
    }

    /// Build from bare closes, stamping them `step_ms` apart starting at `start_ms`.
    pub fn from_closes(start_ms: i64, step_ms: i64, closes: &[f64]) -> Result<Self> {
        if step_ms <= 0 {
            return Err(ScreenError::InvalidValue("step must be > 0"));
        }
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::new(start_ms + i as i64 * step_ms, c))
            .collect();
        Self::new(points)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    /// Last `n` points (or all of them if shorter).
    pub fn tail(&self, n: usize) -> Series {
        let start = self.points.len().saturating_sub(n);
        Series {
            points: self.points[start..].to_vec(),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Series {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        struct Raw {
            points: Vec<PricePoint>,
        }
        let raw = Raw::deserialize(d)?;
        Series::new(raw.points).map_err(serde::de::Error::custom)
    }
}

/// Bar interval requested from a market-data provider
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Interval {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[default]
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H4,
        Interval::D1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
        }
    }

    /// Period id used by crypto OHLCV vendors (e.g. `1HRS`)
    pub fn provider_code(self) -> &'static str {
        match self {
            Interval::M15 => "15MIN",
            Interval::M30 => "30MIN",
            Interval::H1 => "1HRS",
            Interval::H4 => "4HRS",
            Interval::D1 => "1DAY",
        }
    }

    pub fn duration(self) -> std::time::Duration {
        let minutes = match self {
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
            Interval::H4 => 240,
            Interval::D1 => 1440,
        };
        std::time::Duration::from_secs(minutes * 60)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Interval {
    type Err = ScreenError;

    fn from_str(s: &str) -> Result<Self> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s || i.provider_code().eq_ignore_ascii_case(s))
            .ok_or_else(|| ScreenError::InvalidConfig(format!("unknown interval '{s}'")))
    }
}

// ============================================================
// PATTERN RESULT
// ============================================================

/// Unique identifier for a pattern type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct PatternId(pub &'static str);

impl PatternId {
    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Proposed long trade: buy at `entry`, exit at `stop_loss` or `take_profit`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl TradeLevels {
    /// Levels for a BUY setup. Returns None unless `stop_loss < entry < take_profit`
    /// and all three are finite.
    pub fn long(entry: f64, stop_loss: f64, take_profit: f64) -> Option<Self> {
        let finite = entry.is_finite() && stop_loss.is_finite() && take_profit.is_finite();
        (finite && stop_loss < entry && entry < take_profit).then_some(Self {
            entry,
            stop_loss,
            take_profit,
        })
    }

    #[inline]
    pub fn risk(&self) -> f64 {
        self.entry - self.stop_loss
    }

    #[inline]
    pub fn reward(&self) -> f64 {
        self.take_profit - self.entry
    }
}

/// `(take_profit - entry) / (entry - stop_loss)`
///
/// Fails with [`ScreenError::DivisionUndefined`] when the risk is zero or the
/// ratio is not finite, so no infinite rank key can escape.
pub fn risk_reward(levels: &TradeLevels) -> Result<f64> {
    let risk = levels.risk();
    if risk == 0.0 {
        return Err(ScreenError::DivisionUndefined);
    }
    let ratio = levels.reward() / risk;
    if !ratio.is_finite() {
        return Err(ScreenError::DivisionUndefined);
    }
    Ok(ratio)
}

/// Outcome of running one detector over a close series
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PatternResult {
    pub pattern_id: PatternId,
    /// Present only when the pattern was found
    pub levels: Option<TradeLevels>,
}

impl PatternResult {
    pub fn found(pattern_id: PatternId, levels: TradeLevels) -> Self {
        Self {
            pattern_id,
            levels: Some(levels),
        }
    }

    pub fn not_found(pattern_id: PatternId) -> Self {
        Self {
            pattern_id,
            levels: None,
        }
    }

    /// Found when `levels` is Some, otherwise not found
    pub fn from_levels(pattern_id: PatternId, levels: Option<TradeLevels>) -> Self {
        Self { pattern_id, levels }
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        self.levels.is_some()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.pattern_id.as_str()
    }
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

/// Whether a detector performs a real geometric test or triggers unconditionally
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DetectorKind {
    Geometric,
    Placeholder,
}

/// Pattern detector - a pure function from closes (oldest first) to a result.
///
/// Object safe, so custom detectors can be boxed into a [`PatternRegistry`].
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;

    fn kind(&self) -> DetectorKind;

    /// Shortest series the detector will look at. Shorter input fails closed.
    fn min_closes(&self) -> usize {
        detectors::MIN_CLOSES
    }

    fn detect(&self, closes: &[f64]) -> PatternResult;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(&self, closes: &[f64]) -> PatternResult {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, closes)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn kind(&self) -> DetectorKind {
                match self {
                    $(Self::$variant(d) => PatternDetector::kind(d)),*
                }
            }

            #[inline]
            pub fn min_closes(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_closes(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    CupAndHandle(CupAndHandleDetector),
    DoubleBottom(DoubleBottomDetector),
    Placeholder(PlaceholderDetector),
}

// ============================================================
// PATTERN REGISTRY
// ============================================================

enum Registered {
    Builtin(BuiltinDetector),
    Custom(Box<dyn PatternDetector>),
}

impl Registered {
    fn id(&self) -> PatternId {
        match self {
            Registered::Builtin(d) => d.id(),
            Registered::Custom(d) => d.id(),
        }
    }

    fn kind(&self) -> DetectorKind {
        match self {
            Registered::Builtin(d) => d.kind(),
            Registered::Custom(d) => d.kind(),
        }
    }

    fn min_closes(&self) -> usize {
        match self {
            Registered::Builtin(d) => d.min_closes(),
            Registered::Custom(d) => d.min_closes(),
        }
    }

    fn detect(&self, closes: &[f64]) -> PatternResult {
        // The registry enforces the minimum for custom detectors too.
        if closes.len() < self.min_closes() {
            return PatternResult::not_found(self.id());
        }
        match self {
            Registered::Builtin(d) => d.detect(closes),
            Registered::Custom(d) => d.detect(closes),
        }
    }

    fn validate_config(&self) -> Result<()> {
        match self {
            Registered::Builtin(d) => d.validate_config(),
            Registered::Custom(d) => d.validate_config(),
        }
    }
}

/// Name -> detector catalog, in registration order.
///
/// The screener only talks to this type and never to individual detectors.
pub struct PatternRegistry {
    detectors: Vec<Registered>,
}

/// Subset of a registry chosen by name, borrowed for one scan.
pub struct Selection<'a> {
    registry: &'a PatternRegistry,
    indices: Vec<usize>,
}

impl PatternRegistry {
    #[inline]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<PatternId> {
        self.detectors.iter().map(Registered::id).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn kind_of(&self, name: &str) -> Option<DetectorKind> {
        self.position(name).map(|i| self.detectors[i].kind())
    }

    /// Run a single named detector
    pub fn detect(&self, name: &str, closes: &[f64]) -> Result<PatternResult> {
        let i = self
            .position(name)
            .ok_or_else(|| ScreenError::UnknownPattern(name.to_string()))?;
        Ok(self.detectors[i].detect(closes))
    }

    /// Run every registered detector
    pub fn detect_all(&self, closes: &[f64]) -> Vec<PatternResult> {
        self.detectors.iter().map(|d| d.detect(closes)).collect()
    }

    /// Resolve names to a selection. An empty name list selects everything.
    ///
    /// The selection keeps registration order regardless of the order of `names`.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Selection<'_>> {
        if names.is_empty() {
            return Ok(Selection {
                registry: self,
                indices: (0..self.detectors.len()).collect(),
            });
        }

        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let i = self
                .position(name)
                .ok_or_else(|| ScreenError::UnknownPattern(name.to_string()))?;
            indices.push(i);
        }
        indices.sort_unstable();
        indices.dedup();

        Ok(Selection {
            registry: self,
            indices,
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.detectors.iter().position(|d| d.id().as_str() == name)
    }

    fn validate(&self) -> Result<()> {
        for (i, d) in self.detectors.iter().enumerate() {
            d.validate_config()?;
            let id = d.id();
            if self.detectors[..i].iter().any(|other| other.id() == id) {
                return Err(ScreenError::InvalidConfig(format!(
                    "pattern '{id}' registered twice"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRegistry")
            .field("detectors", &self.names())
            .finish()
    }
}

impl Selection<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn names(&self) -> Vec<PatternId> {
        self.indices
            .iter()
            .map(|&i| self.registry.detectors[i].id())
            .collect()
    }

    /// One result per selected detector, in registration order
    pub fn detect(&self, closes: &[f64]) -> Vec<PatternResult> {
        self.indices
            .iter()
            .map(|&i| self.registry.detectors[i].detect(closes))
            .collect()
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternRegistry instances
#[derive(Default)]
pub struct RegistryBuilder {
    detectors: Vec<Registered>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the geometric detectors followed by the placeholder catalog
    pub fn with_all_defaults(self) -> Self {
        self.with_geometric_defaults().with_placeholder_defaults()
    }

    /// Add Cup & Handle and Double Bottom with default thresholds
    pub fn with_geometric_defaults(mut self) -> Self {
        self.detectors.extend([
            Registered::Builtin(BuiltinDetector::CupAndHandle(
                CupAndHandleDetector::with_defaults(),
            )),
            Registered::Builtin(BuiltinDetector::DoubleBottom(
                DoubleBottomDetector::with_defaults(),
            )),
        ]);
        self
    }

    /// Add the 13 named placeholder detectors
    pub fn with_placeholder_defaults(mut self) -> Self {
        self.detectors.extend(
            PlaceholderDetector::catalog()
                .map(|d| Registered::Builtin(BuiltinDetector::Placeholder(d))),
        );
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.detectors.push(Registered::Builtin(detector));
        self
    }

    /// Add a custom detector (vtable dispatch)
    pub fn add_custom<D: PatternDetector + 'static>(mut self, detector: D) -> Self {
        self.detectors.push(Registered::Custom(Box::new(detector)));
        self
    }

    /// Build the registry, rejecting invalid configs and duplicate names
    pub fn build(self) -> Result<PatternRegistry> {
        let registry = PatternRegistry {
            detectors: self.detectors,
        };
        registry.validate()?;
        Ok(registry)
    }
}

// ============================================================
// TESTS
// ============================================================
