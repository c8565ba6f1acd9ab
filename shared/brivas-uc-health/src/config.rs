//! Engine configuration
//!
//! Built once at startup and handed to the engine; nothing in this crate
//! reads the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::types::CheckKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub tcp_timeout_ms: u64,
    pub config_timeout_ms: u64,
    pub realtime_timeout_ms: u64,
    pub counter_timeout_ms: u64,
    /// Deadline for a whole cluster request
    pub request_timeout_ms: u64,
    /// Servers built at once by the cluster aggregator
    pub max_concurrency: usize,
    /// Device cap for the rollup registration query
    pub rollup_device_limit: u32,
    /// Host queried for cluster-wide data; first enabled CUCM node when unset
    pub rollup_host: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tcp_timeout_ms: 2_000,
            config_timeout_ms: 8_000,
            realtime_timeout_ms: 8_000,
            counter_timeout_ms: 8_000,
            request_timeout_ms: 30_000,
            max_concurrency: 8,
            rollup_device_limit: 1_000,
            rollup_host: None,
        }
    }
}

impl EngineConfig {
    pub fn timeout_for(&self, check: CheckKind) -> Duration {
        match check {
            CheckKind::Tcp(_) => Duration::from_millis(self.tcp_timeout_ms),
            CheckKind::Config => self.backend_timeout(Backend::Config),
            CheckKind::Realtime => self.backend_timeout(Backend::Realtime),
            CheckKind::Counters => self.backend_timeout(Backend::Counters),
        }
    }

    pub fn backend_timeout(&self, backend: Backend) -> Duration {
        let ms = match backend {
            Backend::Config => self.config_timeout_ms,
            Backend::Realtime => self.realtime_timeout_ms,
            Backend::Counters => self.counter_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout_for(CheckKind::Tcp(443)), Duration::from_secs(2));
        assert_eq!(config.timeout_for(CheckKind::Counters), Duration::from_secs(8));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = EngineConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"tcpTimeoutMs": 500}"#).unwrap();
        assert_eq!(config.tcp_timeout_ms, 500);
        assert_eq!(config.max_concurrency, 8);
    }
}
