//! In-process request and probe statistics

use std::collections::BTreeMap;
use std::time::Instant;

use brivas_telemetry::{Counter, Histogram, HistogramSummary};
use brivas_uc_health::{CheckKind, ServerHealth};
use dashmap::DashMap;
use serde::Serialize;

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_secs: u64,
    pub requests_total: u64,
    /// Probe latency per check family
    pub checks: BTreeMap<String, HistogramSummary>,
}

pub struct RequestStats {
    started: Instant,
    requests: Counter,
    latencies: DashMap<&'static str, Histogram>,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: Counter::new("uc_status_requests_total"),
            latencies: DashMap::new(),
        }
    }

    pub fn record_request(&self) {
        self.requests.inc();
    }

    /// Feed every check latency of one server into its family histogram
    pub fn record_checks(&self, health: &ServerHealth) {
        for (key, result) in &health.checks {
            let family = CheckKind::from_key(key).map(|k| k.family()).unwrap_or("record");
            self.latencies
                .entry(family)
                .or_insert_with(|| Histogram::new(&format!("uc_status_{}_latency_ms", family)))
                .record(result.latency_ms as f64);
        }
    }

    pub fn snapshot(&self) -> StatsResponse {
        let checks = self
            .latencies
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().summary()))
            .collect();

        StatsResponse {
            uptime_secs: self.started.elapsed().as_secs(),
            requests_total: self.requests.get(),
            checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brivas_uc_health::mock::mock_servers;
    use brivas_uc_health::{HealthStatus, ProbeResult, ServerIdentity};
    use chrono::Utc;
    use serde_json::Map;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn health() -> ServerHealth {
        let record = &mock_servers()[0];
        let mut checks = BTreeMap::new();
        checks.insert("8443".to_string(), ProbeResult::success(Duration::from_millis(4), Map::new()));
        checks.insert("22".to_string(), ProbeResult::success(Duration::from_millis(6), Map::new()));
        checks.insert("config".to_string(), ProbeResult::success(Duration::from_millis(40), Map::new()));
        ServerHealth {
            server: ServerIdentity::from(record),
            applicable: checks.keys().cloned().collect::<BTreeSet<_>>(),
            checks,
            overall_ok: true,
            status: HealthStatus::Up,
            failing: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_checks_grouped_by_family() {
        let stats = RequestStats::new();
        stats.record_request();
        stats.record_checks(&health());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert_eq!(snapshot.checks["tcp"].count, 2);
        assert_eq!(snapshot.checks["config"].count, 1);
        assert!(!snapshot.checks.contains_key("realtime"));
    }
}
