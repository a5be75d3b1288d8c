//! Advisory free-text commentary on ranked setups
//!
//! Narratives never influence ranking. A failing [`NarrativeProvider`] only
//! degrades the text to a placeholder; it never aborts anything.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::warn;

use crate::{provider::ProviderError, Series};

/// Language-model style commentary source
pub trait NarrativeProvider: Send + Sync {
    fn summarize(&self, symbol: &str, series: &Series) -> Result<String, ProviderError>;
}

/// Text used when no narrative could be produced
pub fn placeholder_text(symbol: &str, reason: &dyn std::fmt::Display) -> String {
    format!("Narrative unavailable for {symbol}: {reason}")
}

/// Summarise, degrading any provider failure to [`placeholder_text`].
pub fn summarize_or_placeholder<N: NarrativeProvider + ?Sized>(
    provider: &N,
    symbol: &str,
    series: &Series,
) -> String {
    match provider.summarize(symbol, series) {
        Ok(text) => text,
        Err(e) => {
            warn!(%symbol, error = %e, "narrative provider failed");
            placeholder_text(symbol, &e)
        }
    }
}

// ============================================================
// ANALYSIS LOG
// ============================================================

/// One narrative, as recorded
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisEntry {
    pub symbol: String,
    /// Unix milliseconds when recorded
    pub timestamp: i64,
    pub text: String,
}

/// Append-only, in-memory list of narratives. Not durable.
#[derive(Debug, Default)]
pub struct AnalysisLog {
    entries: RwLock<Vec<AnalysisEntry>>,
}

impl AnalysisLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a narrative stamped with the current time
    pub fn append(&self, symbol: impl Into<String>, text: impl Into<String>) -> AnalysisEntry {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.append_at(symbol, timestamp, text)
    }

    pub fn append_at(
        &self,
        symbol: impl Into<String>,
        timestamp: i64,
        text: impl Into<String>,
    ) -> AnalysisEntry {
        let entry = AnalysisEntry {
            symbol: symbol.into(),
            timestamp,
            text: text.into(),
        };
        self.entries.write().push(entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every entry in insertion order
    pub fn entries(&self) -> Vec<AnalysisEntry> {
        self.entries.read().clone()
    }

    pub fn for_symbol(&self, symbol: &str) -> Vec<AnalysisEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.symbol == symbol)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl NarrativeProvider for Echo {
        fn summarize(&self, symbol: &str, series: &Series) -> Result<String, ProviderError> {
            Ok(format!("{symbol}: {} bars", series.len()))
        }
    }

    struct Down;

    impl NarrativeProvider for Down {
        fn summarize(&self, symbol: &str, _: &Series) -> Result<String, ProviderError> {
            Err(ProviderError::Transient {
                symbol: symbol.to_string(),
                message: "503".to_string(),
            })
        }
    }

    #[test]
    fn test_summarize_ok() {
        let series = Series::from_closes(0, 1, &[1.0, 2.0]).unwrap();
        assert_eq!(summarize_or_placeholder(&Echo, "BTC", &series), "BTC: 2 bars");
    }

    #[test]
    fn test_summarize_degrades() {
        let text = summarize_or_placeholder(&Down, "BTC", &Series::default());
        assert!(text.starts_with("Narrative unavailable for BTC"));
        assert!(text.contains("503"));
    }

    #[test]
    fn test_log_is_append_only_and_ordered() {
        let log = AnalysisLog::new();
        log.append_at("BTC", 1, "first");
        log.append_at("ETH", 2, "second");
        log.append_at("BTC", 3, "third");

        assert_eq!(log.len(), 3);
        let texts: Vec<_> = log.entries().into_iter().map(|e| e.text).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(log.for_symbol("BTC").len(), 2);
    }

    #[test]
    fn test_append_stamps_time() {
        let log = AnalysisLog::new();
        let entry = log.append("SOL", "note");
        assert!(entry.timestamp > 0);
        assert!(!log.is_empty());
    }
}
