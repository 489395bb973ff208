//! Watcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a watcher's restart loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Pause between a failed cycle and the next listing, in milliseconds.
    /// Zero restarts immediately.
    pub restart_delay_ms: u64,
    /// Relist after a graceful stream end instead of stopping.
    pub restart_on_stream_end: bool,
}

impl WatcherConfig {
    /// Pause between a failed cycle and the next listing.
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Set the restart pause.
    #[must_use]
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatcherConfig::default();
        assert_eq!(config.restart_delay(), Duration::ZERO);
        assert!(!config.restart_on_stream_end);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: WatcherConfig =
            serde_json::from_str(r#"{ "restart_delay_ms": 250 }"#).unwrap();
        assert_eq!(config.restart_delay(), Duration::from_millis(250));
        assert!(!config.restart_on_stream_end);
    }

    #[test]
    fn test_with_restart_delay() {
        let config = WatcherConfig::default().with_restart_delay(Duration::from_secs(2));
        assert_eq!(config.restart_delay_ms, 2000);
    }
}
