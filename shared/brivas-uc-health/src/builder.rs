//! Per-server health builder
//!
//! Runs every applicable check for one server concurrently, each under its
//! own timeout, and folds the results through the verdict reducer. A failing
//! or slow check never cancels its siblings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;

use crate::config::EngineConfig;
use crate::probe::{ProbeSet, ProbeTarget};
use crate::types::{CheckKind, HealthError, ProbeResult, ServerHealth, ServerIdentity, ServerRecord};
use crate::verdict;

/// Checks that apply to a record: one per port, plus the protocol
/// checks for server types that support them.
pub fn applicable_checks(record: &ServerRecord) -> Vec<CheckKind> {
    let mut checks: Vec<CheckKind> = record.ports_to_check().into_iter().map(CheckKind::Tcp).collect();
    if record.server_type.has_protocol_checks() {
        checks.extend([CheckKind::Config, CheckKind::Realtime, CheckKind::Counters]);
    }
    checks
}

/// Builds [`ServerHealth`] for one record at a time
#[derive(Clone)]
pub struct HealthBuilder {
    probes: ProbeSet,
    config: Arc<EngineConfig>,
}

impl HealthBuilder {
    pub fn new(probes: ProbeSet, config: Arc<EngineConfig>) -> Self {
        Self { probes, config }
    }

    /// Probe one server.
    ///
    /// Fails only on a structurally invalid record (no address to aim the
    /// checks at, or a zero port). Probe failures are data, never errors.
    pub async fn build(&self, record: &ServerRecord) -> Result<ServerHealth, HealthError> {
        let checks = applicable_checks(record);
        if checks.contains(&CheckKind::Tcp(0)) {
            return Err(HealthError::InvalidServer(format!(
                "server {} lists port 0",
                record.id
            )));
        }

        let host = match record.target_host() {
            Some(host) => host,
            None if checks.is_empty() => "",
            None => {
                return Err(HealthError::InvalidServer(format!(
                    "server {} has neither management address nor fqdn",
                    record.id
                )))
            }
        };
        let target = ProbeTarget::new(host, &record.name);

        let runs = checks.iter().map(|check| {
            let probe = self.probes.for_check(*check);
            let timeout = self.config.timeout_for(*check);
            async move {
                let result = probe.probe(target, timeout).await;
                if result.ok {
                    tracing::debug!(
                        server_id = %record.id,
                        check = %check.key(),
                        latency_ms = result.latency_ms,
                        "Check passed"
                    );
                } else {
                    tracing::warn!(
                        server_id = %record.id,
                        check = %check.key(),
                        error_kind = ?result.error_kind,
                        error = result.error_message.as_deref().unwrap_or(""),
                        latency_ms = result.latency_ms,
                        "Check failed"
                    );
                }
                (check.key(), result)
            }
        });

        let results: BTreeMap<String, ProbeResult> = join_all(runs).await.into_iter().collect();
        let applicable: BTreeSet<String> = checks.iter().map(CheckKind::key).collect();
        let verdict = verdict::classify(&results, &applicable);

        tracing::info!(
            server_id = %record.id,
            server = %record.name,
            server_type = %record.server_type,
            status = verdict.status.as_str(),
            checks = applicable.len(),
            failing = verdict.failing.len(),
            "Server health built"
        );

        Ok(ServerHealth {
            server: ServerIdentity::from(record),
            checks: results,
            applicable,
            overall_ok: verdict.ok,
            status: verdict.status,
            failing: verdict.failing,
            checked_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendSet};
    use crate::mock::{mock_backends, mock_servers, MockConfigClient, MockCounterClient, MockRealtimeClient};
    use crate::probe::PortConnector;
    use crate::types::{HealthStatus, ProbeErrorKind, ServerType};
    use async_trait::async_trait;
    use std::io;
    use std::time::{Duration, Instant};

    struct OpenPorts(Vec<u16>);

    #[async_trait]
    impl PortConnector for OpenPorts {
        async fn connect(&self, _host: &str, port: u16) -> io::Result<()> {
            if self.0.contains(&port) {
                Ok(())
            } else {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            }
        }
    }

    fn builder(backends: BackendSet, open: Vec<u16>, config: EngineConfig) -> HealthBuilder {
        HealthBuilder::new(ProbeSet::new(&backends, Arc::new(OpenPorts(open))), Arc::new(config))
    }

    #[test]
    fn test_applicable_checks_by_type() {
        let servers = mock_servers();
        let cucm = applicable_checks(&servers[0]);
        assert_eq!(
            cucm,
            vec![
                CheckKind::Tcp(8443),
                CheckKind::Tcp(443),
                CheckKind::Config,
                CheckKind::Realtime,
                CheckKind::Counters
            ]
        );
        let unity = applicable_checks(&servers[2]);
        assert_eq!(unity, vec![CheckKind::Tcp(7071), CheckKind::Tcp(443)]);
    }

    #[tokio::test]
    async fn test_healthy_cucm() {
        let b = builder(mock_backends(), vec![8443, 443], EngineConfig::default());
        let health = b.build(&mock_servers()[0]).await.unwrap();
        assert!(health.overall_ok);
        assert_eq!(health.status, HealthStatus::Up);
        assert_eq!(health.checks.len(), 5);
    }

    #[tokio::test]
    async fn test_closed_port_degrades_only_that_check() {
        let b = builder(mock_backends(), vec![8443], EngineConfig::default());
        let health = b.build(&mock_servers()[0]).await.unwrap();
        assert!(!health.overall_ok);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.failing, vec!["443".to_string()]);
        assert_eq!(health.checks["443"].error_kind, ProbeErrorKind::Unreachable);
        assert!(health.checks["config"].ok);
    }

    #[tokio::test]
    async fn test_backends_off_are_not_configured() {
        let b = builder(BackendSet::new(), vec![8443, 443], EngineConfig::default());
        let health = b.build(&mock_servers()[0]).await.unwrap();
        assert!(!health.overall_ok);
        for key in ["config", "realtime", "counters"] {
            assert_eq!(health.checks[key].error_kind, ProbeErrorKind::NotConfigured);
        }
    }

    #[tokio::test]
    async fn test_slow_check_bounded_by_its_timeout() {
        let record = &mock_servers()[0];
        let host = record.target_host().unwrap().to_string();
        let backends = BackendSet::new()
            .with_config(Arc::new(MockConfigClient::new()))
            .with_realtime(Arc::new(MockRealtimeClient::new()))
            .with_counters(Arc::new(MockCounterClient::new().hang_host(&host)));
        let config = EngineConfig {
            counter_timeout_ms: 150,
            ..Default::default()
        };
        let b = builder(backends, vec![8443, 443], config);

        let start = Instant::now();
        let health = b.build(record).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(health.checks["counters"].error_kind, ProbeErrorKind::Timeout);
        assert_eq!(health.failing, vec!["counters".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_recorded() {
        let record = &mock_servers()[0];
        let host = record.target_host().unwrap().to_string();
        let backends = mock_backends().with_config(Arc::new(
            MockConfigClient::new().fail_host(&host, BackendError::Unreachable("refused".into())),
        ));
        let b = builder(backends, vec![8443, 443], EngineConfig::default());
        let health = b.build(record).await.unwrap();
        assert_eq!(health.checks["config"].error_kind, ProbeErrorKind::Unreachable);
        assert!(health.checks["realtime"].ok);
    }

    #[tokio::test]
    async fn test_missing_host_is_invalid() {
        let mut record = mock_servers()[0].clone();
        record.fqdn = String::new();
        record.mgmt_address = None;
        let b = builder(mock_backends(), vec![], EngineConfig::default());
        assert!(matches!(b.build(&record).await, Err(HealthError::InvalidServer(_))));
    }

    #[tokio::test]
    async fn test_no_applicable_checks_is_unknown() {
        let mut record = mock_servers()[2].clone();
        assert_eq!(record.server_type, ServerType::Unity);
        record.ports = Some(vec![]);
        let b = builder(mock_backends(), vec![], EngineConfig::default());
        let health = b.build(&record).await.unwrap();
        assert!(!health.overall_ok);
        assert_eq!(health.status, HealthStatus::Unknown);
        assert!(health.checks.is_empty());
    }
}
