//! Cluster aggregator
//!
//! Builds health for every enabled server with bounded concurrency and
//! returns the full list in input order. A server whose build fails still
//! appears, as a failed entry with an explanatory `record` check. Under a
//! request deadline, servers not finished in time appear with every
//! applicable check marked `timeout`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::builder::{applicable_checks, HealthBuilder};
use crate::types::{
    CheckKind, ClusterHealthReport, HealthError, HealthStatus, ProbeErrorKind, ProbeResult, ServerHealth,
    ServerIdentity, ServerRecord, RECORD_CHECK,
};

pub struct ClusterAggregator {
    builder: HealthBuilder,
    max_concurrency: usize,
}

impl ClusterAggregator {
    pub fn new(builder: HealthBuilder, max_concurrency: usize) -> Self {
        Self {
            builder,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn builder(&self) -> &HealthBuilder {
        &self.builder
    }

    /// Health of every enabled record. Never fails; dropping the future
    /// cancels every in-flight probe.
    pub async fn cluster_health(&self, servers: Vec<ServerRecord>) -> ClusterHealthReport {
        self.aggregate(servers, None).await
    }

    /// As [`cluster_health`](Self::cluster_health), but builds still running
    /// at `deadline` are cut off and reported as timed out. The list stays
    /// complete.
    pub async fn cluster_health_until(&self, servers: Vec<ServerRecord>, deadline: Instant) -> ClusterHealthReport {
        self.aggregate(servers, Some(deadline)).await
    }

    async fn aggregate(&self, servers: Vec<ServerRecord>, deadline: Option<Instant>) -> ClusterHealthReport {
        let enabled: Vec<ServerRecord> = servers.into_iter().filter(|s| s.enabled).collect();
        if enabled.is_empty() {
            return ClusterHealthReport::from_servers(Vec::new());
        }

        let started = Instant::now();
        let builder = &self.builder;
        let enabled = &enabled;
        let results: Vec<ServerHealth> = stream::iter((0..enabled.len()).map(|i| async move {
                let record = &enabled[i];
                let outcome = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, builder.build(record)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            tracing::warn!(server_id = %record.id, "Request deadline reached before server health was built");
                            return past_deadline(record, started.elapsed());
                        }
                    },
                    None => builder.build(record).await,
                };
                match outcome {
                    Ok(health) => health,
                    Err(err) => {
                        tracing::warn!(server_id = %record.id, error = %err, "Server health build failed");
                        failed_build(record, &err)
                    }
                }
            }))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let report = ClusterHealthReport::from_servers(results);
        tracing::info!(
            total = report.total,
            healthy = report.healthy,
            unhealthy = report.unhealthy,
            "Cluster health aggregated"
        );
        report
    }
}

/// Entry whose every listed check failed with the same kind and message
fn stand_in(record: &ServerRecord, keys: Vec<String>, kind: ProbeErrorKind, message: &str, latency: Duration) -> ServerHealth {
    let checks: BTreeMap<String, ProbeResult> = keys
        .iter()
        .map(|key| (key.clone(), ProbeResult::failure(kind, message, latency)))
        .collect();
    let applicable: BTreeSet<String> = keys.iter().cloned().collect();

    ServerHealth {
        server: ServerIdentity::from(record),
        checks,
        applicable,
        overall_ok: false,
        status: HealthStatus::Down,
        failing: keys,
        checked_at: Utc::now(),
    }
}

/// Stand-in entry for a record the builder rejected
fn failed_build(record: &ServerRecord, err: &HealthError) -> ServerHealth {
    stand_in(
        record,
        vec![RECORD_CHECK.to_string()],
        ProbeErrorKind::Unexpected,
        &err.to_string(),
        Duration::ZERO,
    )
}

/// Stand-in entry for a server the request deadline cut off
fn past_deadline(record: &ServerRecord, elapsed: Duration) -> ServerHealth {
    let mut keys: Vec<String> = applicable_checks(record).iter().map(CheckKind::key).collect();
    keys.sort();
    keys.dedup();
    if keys.is_empty() {
        keys.push(RECORD_CHECK.to_string());
    }
    stand_in(
        record,
        keys,
        ProbeErrorKind::Timeout,
        "request deadline reached before the check completed",
        elapsed,
    )
}
