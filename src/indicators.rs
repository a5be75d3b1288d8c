//! Technical indicators over close series
//!
//! Column functions return one value per input index. Columns with a warm-up
//! region use `None` there; no function ever returns NaN or infinity.
//!
//! [`IndicatorSet::annotate`] computes the requested columns and keeps only
//! the rows where all of them are defined.

use crate::{Multiplier, Period, Result, ScreenError, Series};

// ============================================================
// DEFAULTS
// ============================================================

/// RSI reported when the trailing return volatility is zero or the ratio is not finite
pub const RSI_NEUTRAL: f64 = 50.0;

pub const DEFAULT_EMA_SPAN: Period = Period::new_const(20);
pub const DEFAULT_RSI_WINDOW: Period = Period::new_const(14);
pub const DEFAULT_BOLLINGER_WINDOW: Period = Period::new_const(20);
pub const DEFAULT_BOLLINGER_K: Multiplier = Multiplier::new_const(2.0);

// ============================================================
// COLUMN FUNCTIONS
// ============================================================

/// Exponential moving average, `alpha = 2 / (span + 1)`, seeded with the first close.
pub fn ema(closes: &[f64], span: Period) -> Vec<f64> {
    let alpha = 2.0 / (span.get() as f64 + 1.0);
    let mut out = Vec::with_capacity(closes.len());
    let mut prev: Option<f64> = None;

    for &close in closes {
        let next = match prev {
            Some(p) => alpha * close + (1.0 - alpha) * p,
            None => close,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

/// Fractional change from the previous close. `None` at index 0 and after a zero close.
pub fn pct_change(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        if i == 0 || closes[i - 1] == 0.0 {
            out.push(None);
        } else {
            out.push(Some(closes[i] / closes[i - 1] - 1.0));
        }
    }
    out
}

/// Mean and sample standard deviation (n - 1 denominator). None below two values.
fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some((mean, var.sqrt()))
}

/// Relative strength from trailing return statistics.
///
/// `RS = mean(pct change) / std(pct change)` over `window` changes and
/// `RSI = 100 - 100 / (1 + RS)`. `None` for the first `window` indices.
/// Zero volatility or a non-finite result yields [`RSI_NEUTRAL`].
pub fn rsi(closes: &[f64], window: Period) -> Vec<Option<f64>> {
    let w = window.get();
    let changes = pct_change(closes);
    let mut out = vec![None; closes.len()];

    if w < 2 {
        return out;
    }

    let mut buf = Vec::with_capacity(w);
    for i in w..closes.len() {
        buf.clear();
        buf.extend(changes[i + 1 - w..=i].iter().flatten());
        if buf.len() != w {
            continue;
        }

        let Some((mean, std)) = mean_std(&buf) else {
            continue;
        };

        let value = if std == 0.0 {
            RSI_NEUTRAL
        } else {
            let rs = mean / std;
            let v = 100.0 - 100.0 / (1.0 + rs);
            if v.is_finite() {
                v
            } else {
                RSI_NEUTRAL
            }
        };
        out[i] = Some(value);
    }

    out
}

/// Bollinger envelope at one index
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

impl Bands {
    #[inline]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Rolling mean +/- `k` rolling sample standard deviations.
/// `None` for the first `window - 1` indices.
pub fn bollinger(closes: &[f64], window: Period, k: Multiplier) -> Vec<Option<Bands>> {
    let w = window.get();
    let mut out = vec![None; closes.len()];

    if w < 2 || closes.len() < w {
        return out;
    }

    for i in (w - 1)..closes.len() {
        if let Some((mean, std)) = mean_std(&closes[i + 1 - w..=i]) {
            out[i] = Some(Bands {
                lower: mean - k.get() * std,
                middle: mean,
                upper: mean + k.get() * std,
            });
        }
    }

    out
}

// ============================================================
// INDICATOR SET
// ============================================================

/// Bollinger parameters
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BollingerParams {
    pub window: Period,
    pub k: Multiplier,
}

impl Default for BollingerParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_BOLLINGER_WINDOW,
            k: DEFAULT_BOLLINGER_K,
        }
    }
}

/// Which derived columns to compute
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IndicatorSet {
    pub ema_spans: Vec<Period>,
    pub rsi_window: Option<Period>,
    pub bollinger: Option<BollingerParams>,
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self {
            ema_spans: vec![DEFAULT_EMA_SPAN],
            rsi_window: Some(DEFAULT_RSI_WINDOW),
            bollinger: Some(BollingerParams::default()),
        }
    }
}

impl IndicatorSet {
    pub fn new(
        ema_spans: Vec<Period>,
        rsi_window: Option<Period>,
        bollinger: Option<BollingerParams>,
    ) -> Result<Self> {
        let set = Self {
            ema_spans,
            rsi_window,
            bollinger,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ema_spans.is_empty() && self.rsi_window.is_none() && self.bollinger.is_none() {
            return Err(ScreenError::InvalidConfig(
                "indicator set requests no columns".to_string(),
            ));
        }
        if self.rsi_window.is_some_and(|w| w.get() < 2) {
            return Err(ScreenError::InvalidConfig(
                "rsi window must be >= 2".to_string(),
            ));
        }
        if self.bollinger.is_some_and(|b| b.window.get() < 2) {
            return Err(ScreenError::InvalidConfig(
                "bollinger window must be >= 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Largest window in use (0 when only EMAs are requested)
    pub fn max_window(&self) -> usize {
        let rsi = self.rsi_window.map_or(0, Period::get);
        let bb = self.bollinger.map_or(0, |b| b.window.get());
        rsi.max(bb)
    }

    /// Leading rows with at least one undefined column
    pub fn warmup(&self) -> usize {
        let rsi = self.rsi_window.map_or(0, Period::get);
        let bb = self.bollinger.map_or(0, |b| b.window.get() - 1);
        rsi.max(bb)
    }

    /// Compute the requested columns and keep the fully defined tail.
    ///
    /// Fails with [`ScreenError::InsufficientData`] unless the series is longer
    /// than [`max_window`](Self::max_window).
    pub fn annotate(&self, series: &Series) -> Result<AnnotatedSeries> {
        self.validate()?;

        let len = series.len();
        let max_window = self.max_window();
        if len <= max_window {
            return Err(ScreenError::InsufficientData {
                need: max_window + 1,
                got: len,
            });
        }

        let closes = series.closes();
        let ema_full: Vec<(Period, Vec<f64>)> = self
            .ema_spans
            .iter()
            .map(|&span| (span, ema(&closes, span)))
            .collect();
        let rsi_full = self.rsi_window.map(|w| rsi(&closes, w));
        let bb_full = self.bollinger.map(|b| bollinger(&closes, b.window, b.k));

        // First row from which every requested column is defined.
        let start = (self.warmup()..len)
            .find(|&i| {
                rsi_full.as_ref().map_or(true, |c| c[i].is_some())
                    && bb_full.as_ref().map_or(true, |c| c[i].is_some())
            })
            .ok_or(ScreenError::InsufficientData {
                need: max_window + 1,
                got: len,
            })?;

        // Drop any later undefined rows as well (only possible after a zero close).
        let keep: Vec<usize> = (start..len)
            .filter(|&i| {
                rsi_full.as_ref().map_or(true, |c| c[i].is_some())
                    && bb_full.as_ref().map_or(true, |c| c[i].is_some())
            })
            .collect();

        let points = keep.iter().map(|&i| series.points()[i]).collect();
        let ema = ema_full
            .into_iter()
            .map(|(span, col)| (span, keep.iter().map(|&i| col[i]).collect()))
            .collect();
        let rsi = rsi_full.map(|c| keep.iter().filter_map(|&i| c[i]).collect());
        let bollinger = bb_full.map(|c| keep.iter().filter_map(|&i| c[i]).collect());

        Ok(AnnotatedSeries {
            series: Series::new(points)?,
            ema,
            rsi,
            bollinger,
        })
    }
}

// ============================================================
// ANNOTATED SERIES
// ============================================================

/// Fully defined tail of a series with its derived columns.
/// Every column has exactly one value per retained point.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSeries {
    series: Series,
    ema: Vec<(Period, Vec<f64>)>,
    rsi: Option<Vec<f64>>,
    bollinger: Option<Vec<Bands>>,
}

impl AnnotatedSeries {
    #[inline]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    #[inline]
    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn closes(&self) -> Vec<f64> {
        self.series.closes()
    }

    pub fn ema(&self, span: Period) -> Option<&[f64]> {
        self.ema
            .iter()
            .find(|(s, _)| *s == span)
            .map(|(_, col)| col.as_slice())
    }

    pub fn rsi(&self) -> Option<&[f64]> {
        self.rsi.as_deref()
    }

    pub fn bollinger(&self) -> Option<&[Bands]> {
        self.bollinger.as_deref()
    }

    /// Indicator values at the last retained point
    pub fn snapshot(&self) -> Option<IndicatorSnapshot> {
        let last = self.len().checked_sub(1)?;
        Some(IndicatorSnapshot {
            close: self.series.points()[last].close,
            ema: self.ema.iter().map(|(span, col)| (*span, col[last])).collect(),
            rsi: self.rsi.as_ref().map(|c| c[last]),
            bands: self.bollinger.as_ref().map(|c| c[last]),
        })
    }
}

/// Last-bar indicator readings attached to a trade setup
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub ema: Vec<(Period, f64)>,
    pub rsi: Option<f64>,
    pub bands: Option<Bands>,
}

impl IndicatorSnapshot {
    /// Close above every computed EMA
    pub fn above_all_emas(&self) -> bool {
        self.ema.iter().all(|(_, v)| self.close > *v)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: usize) -> Period {
        Period::new(n).unwrap()
    }

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_ema_recurrence() {
        let out = ema(&[10.0, 20.0, 30.0], p(3));
        // alpha = 0.5
        assert_eq!(out, vec![10.0, 15.0, 22.5]);
    }

    #[test]
    fn test_ema_constant_series() {
        let out = ema(&[7.0; 25], p(10));
        assert!(out.iter().all(|&v| v == 7.0));
    }

    #[test]
    fn test_ema_empty() {
        assert!(ema(&[], p(5)).is_empty());
    }

    #[test]
    fn test_pct_change() {
        let out = pct_change(&[100.0, 110.0, 0.0, 5.0]);
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(out[2], Some(-1.0));
        assert_eq!(out[3], None);
    }

    #[test]
    fn test_rsi_warmup() {
        let closes = zigzag(40);
        let out = rsi(&closes, p(14));
        assert_eq!(out.len(), 40);
        assert!(out[..14].iter().all(Option::is_none));
        assert!(out[14..].iter().all(|v| v.is_some_and(f64::is_finite)));
    }

    #[test]
    fn test_rsi_zero_volatility_is_neutral() {
        let out = rsi(&[42.0; 20], p(14));
        assert!(out[14..].iter().all(|&v| v == Some(RSI_NEUTRAL)));
    }

    #[test]
    fn test_rsi_steady_growth_is_neutral() {
        // Doubling every bar: every change is exactly 1.0.
        let closes: Vec<f64> = (0..20).map(|i| 2f64.powi(i)).collect();
        let out = rsi(&closes, p(5));
        assert!(out[5..].iter().all(|&v| v == Some(RSI_NEUTRAL)));
    }

    #[test]
    fn test_rsi_window_below_two() {
        let out = rsi(&zigzag(20), p(1));
        assert!(out.iter().all(Option::is_none));
    }

    #[test]
    fn test_bollinger_warmup_and_bands() {
        let closes = zigzag(30);
        let out = bollinger(&closes, p(20), DEFAULT_BOLLINGER_K);
        assert!(out[..19].iter().all(Option::is_none));

        let bands = out[19].unwrap();
        let mean = closes[..20].iter().sum::<f64>() / 20.0;
        assert!((bands.middle - mean).abs() < 1e-9);
        assert!((bands.upper - bands.middle - (bands.middle - bands.lower)).abs() < 1e-9);
        assert!(bands.width() > 0.0);
    }

    #[test]
    fn test_bollinger_constant_series() {
        let out = bollinger(&[5.0; 20], p(20), DEFAULT_BOLLINGER_K);
        let bands = out[19].unwrap();
        assert_eq!(bands.lower, 5.0);
        assert_eq!(bands.upper, 5.0);
    }

    #[test]
    fn test_annotate_keeps_defined_tail() {
        let series = Series::from_closes(0, 60_000, &zigzag(50)).unwrap();
        let annotated = IndicatorSet::default().annotate(&series).unwrap();

        // warm-up = max(14, 20 - 1) = 19
        assert_eq!(annotated.len(), 31);
        assert_eq!(annotated.rsi().unwrap().len(), 31);
        assert_eq!(annotated.bollinger().unwrap().len(), 31);
        assert_eq!(annotated.ema(DEFAULT_EMA_SPAN).unwrap().len(), 31);
        assert_eq!(annotated.series().points()[0], series.points()[19]);
    }

    #[test]
    fn test_annotate_ema_uses_full_history() {
        let closes = zigzag(50);
        let series = Series::from_closes(0, 60_000, &closes).unwrap();
        let annotated = IndicatorSet::default().annotate(&series).unwrap();
        let full = ema(&closes, DEFAULT_EMA_SPAN);
        assert_eq!(annotated.ema(DEFAULT_EMA_SPAN).unwrap(), &full[19..]);
    }

    #[test]
    fn test_annotate_insufficient_data() {
        let series = Series::from_closes(0, 60_000, &zigzag(20)).unwrap();
        assert!(matches!(
            IndicatorSet::default().annotate(&series),
            Err(ScreenError::InsufficientData { need: 21, got: 20 })
        ));
    }

    #[test]
    fn test_annotate_ema_only() {
        let set = IndicatorSet::new(vec![p(5)], None, None).unwrap();
        let series = Series::from_closes(0, 1, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(set.annotate(&series).unwrap().len(), 3);
        assert!(set.annotate(&Series::default()).is_err());
    }

    #[test]
    fn test_indicator_set_validation() {
        assert!(IndicatorSet::new(vec![], None, None).is_err());
        assert!(IndicatorSet::new(vec![], Some(p(1)), None).is_err());
    }

    #[test]
    fn test_snapshot() {
        let series = Series::from_closes(0, 60_000, &zigzag(50)).unwrap();
        let annotated = IndicatorSet::default().annotate(&series).unwrap();
        let snap = annotated.snapshot().unwrap();
        assert_eq!(Some(snap.close), series.last_close());
        assert_eq!(snap.rsi, annotated.rsi().unwrap().last().copied());
    }

    #[test]
    fn test_snapshot_above_all_emas() {
        let set = IndicatorSet::new(vec![p(3), p(5)], None, None).unwrap();

        let rising: Vec<f64> = (1..=10).map(f64::from).collect();
        let series = Series::from_closes(0, 1, &rising).unwrap();
        assert!(set.annotate(&series).unwrap().snapshot().unwrap().above_all_emas());

        let falling: Vec<f64> = (1..=10).rev().map(f64::from).collect();
        let series = Series::from_closes(0, 1, &falling).unwrap();
        assert!(!set.annotate(&series).unwrap().snapshot().unwrap().above_all_emas());
    }
}
