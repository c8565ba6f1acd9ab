//! Status engine facade
//!
//! Wires the directory, backends and configuration together once at
//! startup. Request-time callers only see these operations and never know
//! whether the clients behind them are live or mocked.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use brivas_core::ServerId;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregator::ClusterAggregator;
use crate::backend::{Backend, BackendError, BackendSet};
use crate::builder::HealthBuilder;
use crate::config::EngineConfig;
use crate::directory::{ServerDirectory, TenantScope};
use crate::probe::{bounded, PortConnector, ProbeSet, ProbeTarget, TcpConnector};
use crate::rollup::{ClusterSummary, Rollup};
use crate::types::{
    CheckKind, ClusterHealthReport, HealthError, HealthStatus, ProbeErrorKind, ProbeResult,
    ServerHealth, ServerType,
};
use crate::verdict;

/// Host (and node name) used for cluster-wide queries
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClusterTarget {
    host: String,
    node: String,
}

impl ClusterTarget {
    fn as_probe_target(&self) -> ProbeTarget<'_> {
        ProbeTarget::new(&self.host, &self.node)
    }
}

/// One probe per backend against the cluster host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub host: Option<String>,
    pub checks: BTreeMap<String, ProbeResult>,
    pub overall_ok: bool,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
}

const BACKEND_CHECKS: [CheckKind; 3] = [CheckKind::Config, CheckKind::Realtime, CheckKind::Counters];

fn backend_of(check: CheckKind) -> Option<Backend> {
    match check {
        CheckKind::Config => Some(Backend::Config),
        CheckKind::Realtime => Some(Backend::Realtime),
        CheckKind::Counters => Some(Backend::Counters),
        CheckKind::Tcp(_) => None,
    }
}

pub struct StatusEngine {
    directory: Arc<dyn ServerDirectory>,
    backends: BackendSet,
    config: Arc<EngineConfig>,
    probes: ProbeSet,
    aggregator: ClusterAggregator,
    rollup: Rollup,
    /// Cluster host found in the directory for the all-tenant scope
    discovered: RwLock<Option<ClusterTarget>>,
}

impl StatusEngine {
    pub fn new(directory: Arc<dyn ServerDirectory>, backends: BackendSet, config: EngineConfig) -> Self {
        Self::with_connector(directory, backends, config, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        directory: Arc<dyn ServerDirectory>,
        backends: BackendSet,
        config: EngineConfig,
        connector: Arc<dyn PortConnector>,
    ) -> Self {
        let config = Arc::new(config);
        let probes = ProbeSet::new(&backends, connector);
        let builder = HealthBuilder::new(probes.clone(), config.clone());
        let aggregator = ClusterAggregator::new(builder, config.concurrency());
        let rollup = Rollup::new(backends.clone(), config.clone());

        tracing::info!(
            backends = ?backends,
            max_concurrency = config.concurrency(),
            request_timeout_ms = config.request_timeout_ms,
            "Status engine initialized"
        );

        Self {
            directory,
            backends,
            config,
            probes,
            aggregator,
            rollup,
            discovered: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<dyn ServerDirectory> {
        &self.directory
    }

    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    async fn within_deadline<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, HealthError>>,
    ) -> Result<T, HealthError> {
        let deadline = self.config.request_timeout();
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| HealthError::DeadlineExceeded(deadline))?
    }

    /// Health of every enabled server in scope.
    ///
    /// The request deadline bounds the whole fan-out but never drops the
    /// report: servers still being built when it passes are listed with
    /// their checks marked as timed out. Only a directory listing that
    /// overruns the deadline fails the call.
    pub async fn cluster_health(&self, scope: &TenantScope) -> Result<ClusterHealthReport, HealthError> {
        let budget = self.config.request_timeout();
        let deadline = tokio::time::Instant::now() + budget;
        let servers = tokio::time::timeout_at(deadline, self.directory.list_enabled_servers(scope))
            .await
            .map_err(|_| HealthError::DeadlineExceeded(budget))??;
        Ok(self.aggregator.cluster_health_until(servers, deadline).await)
    }

    /// Health of one server by id
    pub async fn server_health(&self, id: ServerId) -> Result<ServerHealth, HealthError> {
        self.within_deadline(async {
            let record = self
                .directory
                .get_server(id)
                .await?
                .ok_or(HealthError::NotFound(id))?;
            self.aggregator.builder().build(&record).await
        })
        .await
    }

    /// Fleet rollup against the cluster host
    pub async fn cluster_summary(&self, scope: &TenantScope) -> Result<ClusterSummary, HealthError> {
        self.within_deadline(async {
            let target = self.cluster_target(scope).await?;
            Ok(self.rollup.summarize(target.as_ref().map(|t| t.host.as_str())).await)
        })
        .await
    }

    /// Probe each backend once. The verdict covers only wired backends;
    /// unwired ones are listed as not configured.
    pub async fn backend_status(&self) -> BackendStatus {
        let target = self.cluster_target(&TenantScope::All).await.ok().flatten();

        let checks: BTreeMap<String, ProbeResult> = match &target {
            Some(target) => {
                let runs = BACKEND_CHECKS.iter().map(|check| {
                    let probe = self.probes.for_check(*check);
                    let timeout = self.config.timeout_for(*check);
                    async move { (check.key(), probe.probe(target.as_probe_target(), timeout).await) }
                });
                join_all(runs).await.into_iter().collect()
            }
            None => BACKEND_CHECKS
                .iter()
                .map(|check| {
                    let result = ProbeResult::failure(
                        ProbeErrorKind::NotConfigured,
                        "no host available for cluster queries",
                        Duration::ZERO,
                    );
                    (check.key(), result)
                })
                .collect(),
        };

        let applicable: BTreeSet<String> = BACKEND_CHECKS
            .iter()
            .filter(|check| backend_of(**check).is_some_and(|b| self.backends.is_configured(b)))
            .map(CheckKind::key)
            .collect();
        let verdict = verdict::classify(&checks, &applicable);

        BackendStatus {
            host: target.map(|t| t.host),
            checks,
            overall_ok: verdict.ok,
            status: verdict.status,
            checked_at: Utc::now(),
        }
    }

    /// Configuration backend probe alone
    pub async fn readiness(&self) -> ProbeResult {
        match self.cluster_target(&TenantScope::All).await {
            Ok(Some(target)) => {
                self.probes
                    .for_check(CheckKind::Config)
                    .probe(target.as_probe_target(), self.config.timeout_for(CheckKind::Config))
                    .await
            }
            Ok(None) => ProbeResult::failure(
                ProbeErrorKind::NotConfigured,
                "no host available for cluster queries",
                Duration::ZERO,
            ),
            Err(err) => ProbeResult::failure(ProbeErrorKind::Unexpected, err.to_string(), Duration::ZERO),
        }
    }

    /// Forward a raw named operation to one backend against the cluster host
    pub async fn invoke_raw(
        &self,
        backend: Backend,
        operation: &str,
        params: Value,
    ) -> Result<Value, BackendError> {
        let target = self
            .cluster_target(&TenantScope::All)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?
            .ok_or_else(|| BackendError::NotConfigured("no host available for cluster queries".to_string()))?;

        tracing::info!(backend = %backend, operation = %operation, host = %target.host, "Raw operation");
        bounded(
            self.config.backend_timeout(backend),
            self.backends.invoke(backend, &target.host, operation, params),
        )
        .await
    }

    /// Configured rollup host, else the first enabled CUCM server in scope.
    /// The all-tenant lookup is remembered once found, so status and raw
    /// calls list the directory at most until a CUCM host turns up.
    async fn cluster_target(&self, scope: &TenantScope) -> Result<Option<ClusterTarget>, HealthError> {
        if let Some(host) = self.config.rollup_host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            return Ok(Some(ClusterTarget {
                host: host.to_string(),
                node: host.to_string(),
            }));
        }

        let all_tenants = *scope == TenantScope::All;
        if all_tenants {
            let cached = self.discovered.read().clone();
            if cached.is_some() {
                return Ok(cached);
            }
        }

        let servers = self.directory.list_enabled_servers(scope).await?;
        let target = servers
            .iter()
            .filter(|s| s.server_type == ServerType::Cucm)
            .find_map(|s| {
                s.target_host().map(|host| ClusterTarget {
                    host: host.to_string(),
                    node: s.name.clone(),
                })
            });

        if all_tenants && target.is_some() {
            *self.discovered.write() = target.clone();
        }
        Ok(target)
    }
}
