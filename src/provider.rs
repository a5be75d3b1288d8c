//! Market-data provider abstraction
//!
//! [`MarketDataProvider`] is the seam to any OHLC vendor. This module also
//! ships two adapters: [`RetryingProvider`] (backoff on rate limits and
//! transient failures) and [`InMemoryProvider`] (fixture data).
//!
//! Adapters compose, e.g. `CachedProvider<RetryingProvider<MyVendor>>`.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{Interval, ScreenError, Series};

// ============================================================
// ERRORS
// ============================================================

/// Errors that can occur within a `MarketDataProvider` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The symbol resolved but the requested window is empty.
    #[error("No data for {symbol}")]
    NoData { symbol: String },

    /// The vendor asked us to slow down.
    #[error("Rate limited while fetching {symbol}")]
    RateLimited { symbol: String },

    /// The vendor does not know the symbol.
    #[error("Invalid symbol: {symbol}")]
    InvalidSymbol { symbol: String },

    /// Network failure, timeout, 5xx and the like.
    #[error("Transient failure fetching {symbol}: {message}")]
    Transient { symbol: String, message: String },
}

impl ProviderError {
    /// Worth another attempt after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Transient { .. }
        )
    }

    pub fn symbol(&self) -> &str {
        match self {
            ProviderError::NoData { symbol }
            | ProviderError::RateLimited { symbol }
            | ProviderError::InvalidSymbol { symbol }
            | ProviderError::Transient { symbol, .. } => symbol,
        }
    }
}

impl From<ProviderError> for ScreenError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NoData { symbol } => ScreenError::NoData { symbol },
            ProviderError::RateLimited { symbol } => ScreenError::RateLimited { symbol },
            ProviderError::InvalidSymbol { symbol } => ScreenError::InvalidSymbol { symbol },
            other @ ProviderError::Transient { .. } => ScreenError::Provider(other.to_string()),
        }
    }
}

// ============================================================
// PROVIDER TRAIT
// ============================================================

/// Source of historical price series
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the last `lookback` worth of `interval` bars for `symbol`, oldest first.
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: Interval,
    ) -> Result<Series, ProviderError>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for &P {
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: Interval,
    ) -> Result<Series, ProviderError> {
        (**self).fetch(symbol, lookback, interval)
    }
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Box<P> {
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: Interval,
    ) -> Result<Series, ProviderError> {
        (**self).fetch(symbol, lookback, interval)
    }
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Arc<P> {
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: Interval,
    ) -> Result<Series, ProviderError> {
        (**self).fetch(symbol, lookback, interval)
    }
}

// ============================================================
// RETRY
// ============================================================

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, `max_attempts` times in total
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            multiplier: 1.0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let ms = self.initial_backoff_ms as f64 * self.multiplier.powi(exp);
        let capped = ms.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.max_attempts == 0 {
            return Err(ScreenError::InvalidConfig(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ScreenError::InvalidConfig(
                "retry.multiplier must be finite and >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retries rate limits and transient failures; a failure that persists
/// through every attempt is reported as [`ProviderError::NoData`].
#[derive(Debug, Clone)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: MarketDataProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: MarketDataProvider> MarketDataProvider for RetryingProvider<P> {
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: Interval,
    ) -> Result<Series, ProviderError> {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.inner.fetch(symbol, lookback, interval) {
                Ok(series) => return Ok(series),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(%symbol, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying fetch");
                    std::thread::sleep(delay);
                }
                Err(e) if e.is_retryable() => {
                    warn!(%symbol, attempts, error = %e, "fetch failed after retries");
                    return Err(ProviderError::NoData {
                        symbol: symbol.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::NoData {
            symbol: symbol.to_string(),
        })
    }
}

// ============================================================
// IN-MEMORY PROVIDER
// ============================================================

/// Fixture provider backed by a symbol -> series map.
///
/// `lookback` is measured back from each series' last timestamp; `interval`
/// is ignored since fixtures carry a single resolution.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, Series>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: impl Into<String>, series: Series) -> Self {
        self.insert(symbol, series);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, series: Series) {
        self.series.insert(symbol.into(), series);
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl MarketDataProvider for InMemoryProvider {
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        _interval: Interval,
    ) -> Result<Series, ProviderError> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| ProviderError::InvalidSymbol {
                symbol: symbol.to_string(),
            })?;

        let Some(last) = series.points().last() else {
            return Err(ProviderError::NoData {
                symbol: symbol.to_string(),
            });
        };

        let window_ms = i64::try_from(lookback.as_millis()).unwrap_or(i64::MAX);
        let cutoff = last.timestamp.saturating_sub(window_ms);
        let keep = series
            .points()
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .count();

        debug!(%symbol, points = keep, "fixture fetch");
        Ok(series.tail(keep))
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    struct Flaky {
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
    }

    impl MarketDataProvider for Flaky {
        fn fetch(&self, _: &str, _: Duration, _: Interval) -> Result<Series, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(Series::from_closes(0, HOUR_MS, &[1.0, 2.0]).unwrap())
            }
        }
    }

    fn flaky(failures: u32, error: ProviderError) -> Flaky {
        Flaky {
            failures,
            error,
            calls: AtomicU32::new(0),
        }
    }

    fn rate_limited() -> ProviderError {
        ProviderError::RateLimited {
            symbol: "BTC".to_string(),
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(20), Duration::from_millis(5_000));
    }

    #[test]
    fn test_retry_recovers() {
        let provider = RetryingProvider::new(flaky(2, rate_limited()), RetryPolicy::immediate(3));
        assert!(provider.fetch("BTC", Duration::from_secs(60), Interval::H1).is_ok());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_exhausted_maps_to_no_data() {
        let provider = RetryingProvider::new(flaky(5, rate_limited()), RetryPolicy::immediate(3));
        assert_eq!(
            provider.fetch("BTC", Duration::from_secs(60), Interval::H1),
            Err(ProviderError::NoData {
                symbol: "BTC".to_string()
            })
        );
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_skips_permanent_errors() {
        let invalid = ProviderError::InvalidSymbol {
            symbol: "NOPE".to_string(),
        };
        let provider = RetryingProvider::new(flaky(5, invalid.clone()), RetryPolicy::immediate(3));
        assert_eq!(
            provider.fetch("NOPE", Duration::from_secs(60), Interval::H1),
            Err(invalid)
        );
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::immediate(0).validate().is_err());
        let bad = RetryPolicy {
            multiplier: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_in_memory_lookback() {
        let closes: Vec<f64> = (0..100).map(f64::from).collect();
        let provider = InMemoryProvider::new()
            .with_series("ETH", Series::from_closes(0, HOUR_MS, &closes).unwrap());

        // 47 hours back from the last bar plus the last bar itself
        let series = provider
            .fetch("ETH", Duration::from_secs(47 * 3600), Interval::H1)
            .unwrap();
        assert_eq!(series.len(), 48);
        assert_eq!(series.last_close(), Some(99.0));
    }

    #[test]
    fn test_in_memory_errors() {
        let provider = InMemoryProvider::new().with_series("EMPTY", Series::default());
        assert!(matches!(
            provider.fetch("EMPTY", Duration::from_secs(60), Interval::H1),
            Err(ProviderError::NoData { .. })
        ));
        assert!(matches!(
            provider.fetch("MISSING", Duration::from_secs(60), Interval::H1),
            Err(ProviderError::InvalidSymbol { .. })
        ));
    }

    #[test]
    fn test_error_conversion() {
        let e: ScreenError = rate_limited().into();
        assert!(matches!(e, ScreenError::RateLimited { .. }));

        let e: ScreenError = ProviderError::Transient {
            symbol: "X".to_string(),
            message: "timeout".to_string(),
        }
        .into();
        assert!(matches!(e, ScreenError::Provider(msg) if msg.contains("timeout")));
    }
}
