//! Universe screening and risk/reward ranking
//!
//! A [`Screener`] owns a [`PatternRegistry`], a [`MarketDataProvider`] and a
//! dedicated rayon pool sized by `max_concurrency`. Each symbol is fetched,
//! optionally annotated with indicators, and run through the selected
//! detectors independently. Only the final ranking is order sensitive.
//!
//! One bad symbol never aborts a scan: fetch failures and short series are
//! reported in [`ScanReport::skipped`].

use std::{
    cmp::Ordering as CmpOrdering,
    collections::{BTreeSet, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    cache::CachedProvider,
    config::ScreenerConfig,
    detectors::MIN_CLOSES,
    indicators::IndicatorSnapshot,
    narrative::{placeholder_text, summarize_or_placeholder, AnalysisEntry, AnalysisLog, NarrativeProvider},
    provider::{MarketDataProvider, RetryingProvider},
    risk_reward, PatternRegistry, PatternResult, Result, ScreenError, Selection, TradeLevels,
};

// ============================================================
// CANCELLATION
// ============================================================

/// Cooperative cancellation: a shared flag plus an optional deadline.
///
/// Clones share the flag, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().child_with_timeout(timeout)
    }

    /// Clone sharing this token's flag, with a deadline no later than `timeout` from now
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ============================================================
// RESULTS
// ============================================================

/// A detected pattern on one symbol with its reward per unit of risk
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TradeSetup {
    pub symbol: String,
    pub pattern: PatternResult,
    pub risk_reward: f64,
    /// Last-bar indicator readings, when the scan ran with indicators
    pub indicators: Option<IndicatorSnapshot>,
}

impl TradeSetup {
    /// Levels of the underlying detection (always present for a setup)
    pub fn levels(&self) -> Option<TradeLevels> {
        self.pattern.levels
    }

    pub fn pattern_name(&self) -> &'static str {
        self.pattern.name()
    }
}

/// Symbol left out of a scan and why
#[derive(Debug, Clone)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: ScreenError,
}

/// Outcome of one scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Best setups first, at most `top_n`
    pub setups: Vec<TradeSetup>,
    /// Symbols whose fetch failed or whose data was too short, sorted by symbol
    pub skipped: Vec<SkippedSymbol>,
    /// Symbols not started before cancellation, sorted
    pub cancelled: Vec<String>,
}

impl ScanReport {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.setups.is_empty()
    }

    /// Distinct symbols among the ranked setups, best first
    pub fn symbols(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.setups
            .iter()
            .map(|s| s.symbol.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }
}

enum SymbolOutcome {
    Screened(Vec<TradeSetup>),
    Skipped(SkippedSymbol),
    Cancelled(String),
}

/// Descending risk/reward, then symbol, then pattern name.
pub fn compare_setups(a: &TradeSetup, b: &TradeSetup) -> CmpOrdering {
    b.risk_reward
        .total_cmp(&a.risk_reward)
        .then_with(|| a.symbol.cmp(&b.symbol))
        .then_with(|| a.pattern.name().cmp(b.pattern.name()))
}

/// Sort with [`compare_setups`] and keep the best `top_n`.
pub fn rank(mut setups: Vec<TradeSetup>, top_n: usize) -> Vec<TradeSetup> {
    setups.sort_by(compare_setups);
    setups.truncate(top_n);
    setups
}

// ============================================================
// SCREENER
// ============================================================

/// Scans a universe of symbols against a pattern registry
pub struct Screener<P> {
    registry: PatternRegistry,
    provider: P,
    config: ScreenerConfig,
    pool: rayon::ThreadPool,
}

impl<P: MarketDataProvider> Screener<P> {
    /// Validate `config` and spin up a worker pool of `max_concurrency` threads
    pub fn new(registry: PatternRegistry, provider: P, config: ScreenerConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency)
            .thread_name(|i| format!("tradescan-worker-{i}"))
            .build()
            .map_err(|e| ScreenError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            registry,
            provider,
            config,
            pool,
        })
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    /// Screen `universe` with the named detectors (empty = all) and keep the best `top_n`.
    ///
    /// Only an unknown detector name is an error. Zero setups is an empty report.
    pub fn scan<S, D>(&self, universe: &[S], detectors: &[D], top_n: usize) -> Result<ScanReport>
    where
        S: AsRef<str> + Sync,
        D: AsRef<str>,
    {
        self.scan_with_token(universe, detectors, top_n, &CancellationToken::new())
    }

    /// [`scan`](Self::scan) with an external cancellation token.
    ///
    /// Symbols not yet started when the token fires (or the configured
    /// timeout elapses) are listed in [`ScanReport::cancelled`]; everything
    /// already screened is still ranked.
    pub fn scan_with_token<S, D>(
        &self,
        universe: &[S],
        detectors: &[D],
        top_n: usize,
        token: &CancellationToken,
    ) -> Result<ScanReport>
    where
        S: AsRef<str> + Sync,
        D: AsRef<str>,
    {
        let selection = self.registry.select(detectors)?;
        let token = match self.config.timeout() {
            Some(timeout) => token.child_with_timeout(timeout),
            None => token.clone(),
        };

        let symbols: Vec<&str> = universe
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        debug!(
            symbols = symbols.len(),
            detectors = selection.len(),
            "scan started"
        );

        let outcomes: Vec<SymbolOutcome> = self.pool.install(|| {
            symbols
                .par_iter()
                .map(|symbol| self.screen_symbol(symbol, &selection, &token))
                .collect()
        });

        let mut setups = Vec::new();
        let mut skipped = Vec::new();
        let mut cancelled = Vec::new();

        for outcome in outcomes {
            match outcome {
                SymbolOutcome::Screened(found) => setups.extend(found),
                SymbolOutcome::Skipped(s) => skipped.push(s),
                SymbolOutcome::Cancelled(symbol) => cancelled.push(symbol),
            }
        }

        let candidates = setups.len();
        let report = ScanReport {
            setups: rank(setups, top_n),
            skipped,
            cancelled,
        };

        info!(
            symbols = symbols.len(),
            candidates,
            ranked = report.setups.len(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled.len(),
            "scan complete"
        );

        Ok(report)
    }

    /// [`scan`](Self::scan) with the configured `top_n`
    pub fn scan_default<S, D>(&self, universe: &[S], detectors: &[D]) -> Result<ScanReport>
    where
        S: AsRef<str> + Sync,
        D: AsRef<str>,
    {
        self.scan(universe, detectors, self.config.top_n)
    }

    /// Run the named detectors (empty = all) on one symbol.
    ///
    /// Returns one result per selected detector in registry order, found or not.
    /// Data errors (`NoData`, `InvalidSymbol`, ...) are returned to the caller;
    /// a short series just yields `found = false` everywhere.
    pub fn inspect<D: AsRef<str>>(&self, symbol: &str, detectors: &[D]) -> Result<Vec<PatternResult>> {
        let selection = self.registry.select(detectors)?;
        let series = self
            .provider
            .fetch(symbol, self.config.lookback(), self.config.interval)?;

        if series.is_empty() {
            return Err(ScreenError::NoData {
                symbol: symbol.to_string(),
            });
        }

        let closes = match &self.config.indicators {
            Some(set) => match set.annotate(&series) {
                Ok(annotated) => annotated.closes(),
                Err(ScreenError::InsufficientData { .. }) => Vec::new(),
                Err(e) => return Err(e),
            },
            None => series.closes(),
        };

        Ok(selection.detect(&closes))
    }

    /// Ask `narrator` about each distinct symbol in `report`, best first,
    /// recording every text in `log`. Failures become placeholder texts.
    pub fn narrate<N: NarrativeProvider + ?Sized>(
        &self,
        report: &ScanReport,
        narrator: &N,
        log: &AnalysisLog,
    ) -> Vec<AnalysisEntry> {
        report
            .symbols()
            .into_iter()
            .map(|symbol| {
                let text = match self
                    .provider
                    .fetch(symbol, self.config.lookback(), self.config.interval)
                {
                    Ok(series) => summarize_or_placeholder(narrator, symbol, &series),
                    Err(e) => placeholder_text(symbol, &e),
                };
                log.append(symbol, text)
            })
            .collect()
    }

    fn screen_symbol(
        &self,
        symbol: &str,
        selection: &Selection<'_>,
        token: &CancellationToken,
    ) -> SymbolOutcome {
        if token.is_cancelled() {
            return SymbolOutcome::Cancelled(symbol.to_string());
        }

        let skip = |reason: ScreenError| {
            debug!(%symbol, %reason, "symbol skipped");
            SymbolOutcome::Skipped(SkippedSymbol {
                symbol: symbol.to_string(),
                reason,
            })
        };

        let series = match self
            .provider
            .fetch(symbol, self.config.lookback(), self.config.interval)
        {
            Ok(series) => series,
            Err(e) => return skip(e.into()),
        };

        if series.len() < MIN_CLOSES {
            return skip(ScreenError::InsufficientData {
                need: MIN_CLOSES,
                got: series.len(),
            });
        }

        let (closes, snapshot) = match &self.config.indicators {
            Some(set) => match set.annotate(&series) {
                Ok(annotated) => (annotated.closes(), annotated.snapshot()),
                Err(e) => return skip(e),
            },
            None => (series.closes(), None),
        };

        if closes.len() < MIN_CLOSES {
            return skip(ScreenError::InsufficientData {
                need: MIN_CLOSES,
                got: closes.len(),
            });
        }

        if let (Some(min_rsi), Some(rsi)) = (
            self.config.min_rsi,
            snapshot.as_ref().and_then(|s| s.rsi),
        ) {
            if rsi < min_rsi {
                debug!(%symbol, rsi, min_rsi, "below momentum floor");
                return SymbolOutcome::Screened(Vec::new());
            }
        }

        let setups = selection
            .detect(&closes)
            .into_iter()
            .filter_map(|pattern| {
                let levels = pattern.levels?;
                match risk_reward(&levels) {
                    Ok(rr) => Some(TradeSetup {
                        symbol: symbol.to_string(),
                        pattern,
                        risk_reward: rr,
                        indicators: snapshot.clone(),
                    }),
                    Err(e) => {
                        debug!(%symbol, pattern = %pattern.pattern_id, error = %e, "setup excluded");
                        None
                    }
                }
            })
            .collect();

        SymbolOutcome::Screened(setups)
    }
}

impl<P: MarketDataProvider> Screener<CachedProvider<RetryingProvider<P>>> {
    /// Wrap `inner` in the retry and cache layers described by `config.retry`
    /// and `config.cache`, then build the screener.
    pub fn from_config(registry: PatternRegistry, inner: P, config: ScreenerConfig) -> Result<Self> {
        config.validate()?;
        let provider = CachedProvider::new(RetryingProvider::new(inner, config.retry), config.cache);
        Self::new(registry, provider, config)
    }
}

impl<P> std::fmt::Debug for Screener<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screener")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================
// TESTS
// ============================================================
