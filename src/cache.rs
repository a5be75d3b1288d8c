//! Response cache for market-data providers.
//!
//! [`CachedProvider`] memoises successful fetches keyed by `(symbol, interval)`.
//! Entries expire after `ttl`; when the cache is full, expired entries are
//! purged first and then the oldest insertion is evicted.
//!
//! The lock is never held across a fetch, so two workers asking for the same
//! cold key may both hit the inner provider. The second insert wins.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    provider::{MarketDataProvider, ProviderError},
    Interval, Result, ScreenError, Series,
};

/// Cache sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 512,
        }
    }
}

impl CacheConfig {
    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(ScreenError::InvalidConfig(
                "cache.max_entries must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

type Key = (String, Interval);

#[derive(Debug, Clone)]
struct Entry {
    series: Series,
    inserted: Instant,
}

/// Memoising wrapper around another provider
#[derive(Debug)]
pub struct CachedProvider<P> {
    inner: P,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<Key, Entry>>,
}

impl<P: MarketDataProvider> CachedProvider<P> {
    pub fn new(inner: P, config: CacheConfig) -> Self {
        Self::with_ttl(inner, config.ttl(), config.max_entries)
    }

    pub fn with_ttl(inner: P, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        Self::purge_locked(&mut entries, self.ttl)
    }

    fn purge_locked(entries: &mut HashMap<Key, Entry>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, e| e.inserted.elapsed() < ttl);
        before - entries.len()
    }

    fn lookup(&self, key: &Key) -> Option<Series> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.inserted.elapsed() < self.ttl)
            .map(|e| e.series.clone())
    }

    fn store(&self, key: Key, series: Series) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            Self::purge_locked(&mut entries, self.ttl);
        }
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(symbol = %oldest.0, interval = %oldest.1, "cache evict");
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            Entry {
                series,
                inserted: Instant::now(),
            },
        );
    }
}

impl<P: MarketDataProvider> MarketDataProvider for CachedProvider<P> {
    fn fetch(
        &self,
        symbol: &str,
        lookback: Duration,
        interval: Interval,
    ) -> std::result::Result<Series, ProviderError> {
        let key = (symbol.to_string(), interval);

        if let Some(series) = self.lookup(&key) {
            debug!(%symbol, %interval, "cache hit");
            return Ok(series);
        }

        debug!(%symbol, %interval, "cache miss");
        let series = self.inner.fetch(symbol, lookback, interval)?;
        self.store(key, series.clone());
        Ok(series)
    }
}
