//! Structured logging setup
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init`] once; later calls are no-ops.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over `level` when set. `json` switches to one JSON object per line.
pub fn init(level: &str, json: bool) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let result = if json {
            tracing_subscriber::fmt()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_env_filter(filter)
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_env_filter(filter)
                .try_init()
        };

        // Another subscriber may already be installed (e.g. by the host app).
        if result.is_ok() {
            tracing::debug!(%level, json, "logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug", false);
        init("info", true);
    }
}
