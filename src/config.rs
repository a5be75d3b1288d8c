//! Screener configuration
//!
//! Every field has a default, so a config file only needs the keys it changes.
//!
//! # Example
//!
//! ```rust
//! use tradescan::config::ScreenerConfig;
//! use tradescan::Interval;
//!
//! let config = ScreenerConfig::from_json_str(r#"{ "interval": "4h", "top_n": 5 }"#).unwrap();
//! assert_eq!(config.interval, Interval::H4);
//! assert_eq!(config.max_concurrency, 8);
//! ```

use std::{path::Path, time::Duration};

use tracing::warn;

use crate::{
    cache::CacheConfig, detectors::MIN_CLOSES, indicators::IndicatorSet, provider::RetryPolicy,
    Interval, Result, ScreenError,
};

/// Two days of history, as the screener has always requested
pub const DEFAULT_LOOKBACK_SECS: u64 = 2 * 24 * 3600;
/// Charts shown per scan
pub const DEFAULT_TOP_N: usize = 6;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Everything a [`Screener`](crate::screener::Screener) needs besides its registry and provider
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenerConfig {
    pub interval: Interval,
    pub lookback_secs: u64,
    pub top_n: usize,
    /// Worker threads for the per-symbol fetch + detect pipeline
    pub max_concurrency: usize,
    /// Symbols not started before this elapses are reported as cancelled
    pub timeout_ms: Option<u64>,
    /// When set, detectors run on the indicator-annotated tail
    pub indicators: Option<IndicatorSet>,
    /// Drop setups whose last RSI is below this (needs `indicators.rsi_window`)
    pub min_rsi: Option<f64>,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            lookback_secs: DEFAULT_LOOKBACK_SECS,
            top_n: DEFAULT_TOP_N,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout_ms: None,
            indicators: None,
            min_rsi: None,
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ScreenerConfig {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ScreenError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ScreenError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ScreenError::InvalidConfig(e.to_string()))
    }

    #[inline]
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookback_secs == 0 {
            return Err(ScreenError::InvalidConfig(
                "lookback_secs must be > 0".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(ScreenError::InvalidConfig("top_n must be > 0".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(ScreenError::InvalidConfig(
                "max_concurrency must be > 0".to_string(),
            ));
        }
        if let Some(indicators) = &self.indicators {
            indicators.validate()?;
        }
        if let Some(min_rsi) = self.min_rsi {
            if !min_rsi.is_finite() {
                return Err(ScreenError::InvalidConfig(
                    "min_rsi must be finite".to_string(),
                ));
            }
            if self.indicators.as_ref().and_then(|i| i.rsi_window).is_none() {
                return Err(ScreenError::InvalidConfig(
                    "min_rsi requires indicators.rsi_window".to_string(),
                ));
            }
        }
        self.cache.validate()?;
        self.retry.validate()?;

        let bars = self.lookback_secs / self.interval.duration().as_secs();
        if (bars as usize) < MIN_CLOSES {
            warn!(
                interval = %self.interval,
                lookback_secs = self.lookback_secs,
                bars,
                "lookback yields fewer bars than detectors need; every symbol will be skipped"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScreenerConfig::default();
        assert_eq!(config.interval, Interval::H1);
        assert_eq!(config.lookback(), Duration::from_secs(172_800));
        assert_eq!(config.top_n, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(
            ScreenerConfig::from_json_str("{}").unwrap(),
            ScreenerConfig::default()
        );
    }

    #[test]
    fn test_json_round_trip() {
        let config = ScreenerConfig {
            interval: Interval::M15,
            indicators: Some(IndicatorSet::default()),
            min_rsi: Some(40.0),
            timeout_ms: Some(2_500),
            ..Default::default()
        };
        let json = config.to_json_pretty().unwrap();
        assert_eq!(ScreenerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_nested_sections() {
        let json = r#"{
            "indicators": { "ema_spans": [9, 21], "rsi_window": 14 },
            "cache": { "ttl_secs": 60 },
            "retry": { "max_attempts": 5 }
        }"#;
        let config = ScreenerConfig::from_json_str(json).unwrap();
        let indicators = config.indicators.unwrap();
        assert_eq!(indicators.ema_spans.len(), 2);
        assert!(indicators.bollinger.is_some());
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_entries, 512);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 200);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(ScreenerConfig::from_json_str(r#"{"top_n": 0}"#).is_err());
        assert!(ScreenerConfig::from_json_str(r#"{"max_concurrency": 0}"#).is_err());
        assert!(ScreenerConfig::from_json_str(r#"{"interval": "2h"}"#).is_err());
        assert!(ScreenerConfig::from_json_str(r#"{"indicators": {"rsi_window": 0}}"#).is_err());
        assert!(ScreenerConfig::from_json_str(r#"{"min_rsi": 50.0}"#).is_err());
        assert!(ScreenerConfig::from_json_str(r#"{"unknown": 1}"#).is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        assert!(matches!(
            ScreenerConfig::from_path("/nonexistent/tradescan.json"),
            Err(ScreenError::InvalidConfig(_))
        ));
    }
}
