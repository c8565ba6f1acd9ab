//! Cluster Scenario Tests
//!
//! End-to-end runs of the status engine over mock backends and a fake port
//! connector.

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use brivas_core::ServerId;
use brivas_uc_health::mock::{
    mock_backends, mock_servers, MockConfigClient, MockCounterClient, MockRealtimeClient,
};
use brivas_uc_health::{
    Backend, BackendError, BackendSet, EngineConfig, HealthError, HealthStatus, PortConnector,
    ProbeErrorKind, ServerDirectory, ServerRecord, StaticDirectory, StatusEngine, TenantScope,
};

// Port connector that succeeds for a fixed set of (host, port) pairs
struct FakePorts {
    open: HashSet<(String, u16)>,
}

impl FakePorts {
    fn all_open(servers: &[ServerRecord]) -> Self {
        let open = servers
            .iter()
            .flat_map(|s| {
                let host = s.target_host().unwrap_or_default().to_string();
                s.ports_to_check().into_iter().map(move |p| (host.clone(), p))
            })
            .collect();
        Self { open }
    }

    fn close(mut self, host: &str, port: u16) -> Self {
        self.open.remove(&(host.to_string(), port));
        self
    }
}

#[async_trait]
impl PortConnector for FakePorts {
    async fn connect(&self, host: &str, port: u16) -> io::Result<()> {
        if self.open.contains(&(host.to_string(), port)) {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        }
    }
}

fn build_engine(servers: Vec<ServerRecord>, backends: BackendSet, config: EngineConfig) -> StatusEngine {
    let ports = FakePorts::all_open(&servers);
    engine_with_ports(servers, backends, config, ports)
}

fn engine_with_ports(
    servers: Vec<ServerRecord>,
    backends: BackendSet,
    config: EngineConfig,
    ports: FakePorts,
) -> StatusEngine {
    StatusEngine::with_connector(
        Arc::new(StaticDirectory::new(servers)),
        backends,
        config,
        Arc::new(ports),
    )
}

#[tokio::test]
async fn test_config_timeout_on_one_cucm_server() {
    let mut servers = mock_servers();
    // protocol checks only, so the map holds exactly config/realtime/counters
    servers[0].ports = Some(vec![]);
    let slow_host = servers[0].target_host().unwrap().to_string();

    let backends = mock_backends().with_config(Arc::new(MockConfigClient::new().hang_host(&slow_host)));
    let config = EngineConfig {
        config_timeout_ms: 100,
        ..Default::default()
    };
    let engine = build_engine(servers, backends, config);

    let report = engine.cluster_health(&TenantScope::All).await.unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.healthy, 2);

    let slow = &report.servers[0];
    assert!(!slow.overall_ok);
    assert_eq!(slow.checks.len(), 3);
    let timeouts = slow
        .checks
        .values()
        .filter(|r| r.error_kind == ProbeErrorKind::Timeout)
        .count();
    let oks = slow.checks.values().filter(|r| r.ok).count();
    assert_eq!((timeouts, oks), (1, 2));
    assert!(!slow.checks["config"].ok);

    assert!(report.servers[1].overall_ok);
    assert!(report.servers[2].overall_ok);
}

#[tokio::test]
async fn test_empty_server_list() {
    let engine = build_engine(Vec::new(), mock_backends(), EngineConfig::default());
    let report = engine.cluster_health(&TenantScope::All).await.unwrap();
    assert_eq!(report.total, 0);
    assert!(report.servers.is_empty());
}

#[tokio::test]
async fn test_unity_server_uses_only_port_checks() {
    let servers: Vec<ServerRecord> = mock_servers()
        .into_iter()
        .filter(|s| s.name == "cucx-ucxn")
        .collect();
    let host = servers[0].target_host().unwrap().to_string();
    let ports = FakePorts::all_open(&servers).close(&host, 443);
    let engine = engine_with_ports(servers.clone(), mock_backends(), EngineConfig::default(), ports);

    // one reachable default port is not enough under strict AND
    let health = engine.server_health(servers[0].id).await.unwrap();
    assert!(!health.overall_ok);
    assert_eq!(health.status, HealthStatus::Degraded);

    let engine = build_engine(servers.clone(), mock_backends(), EngineConfig::default());
    let health = engine.server_health(servers[0].id).await.unwrap();
    assert!(health.overall_ok);
    let keys: Vec<&str> = health.checks.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["443", "7071"]);
    for key in ["config", "realtime", "counters"] {
        assert!(!health.checks.contains_key(key));
    }
}

#[tokio::test]
async fn test_unreachable_config_isolated_to_one_server() {
    let servers = mock_servers();
    let bad_host = servers[1].target_host().unwrap().to_string();
    let backends = mock_backends().with_config(Arc::new(
        MockConfigClient::new().fail_host(&bad_host, BackendError::Unreachable("connection refused".into())),
    ));
    let engine = build_engine(servers, backends, EngineConfig::default());

    let report = engine.cluster_health(&TenantScope::All).await.unwrap();
    assert_eq!(report.servers[1].checks["config"].error_kind, ProbeErrorKind::Unreachable);
    assert!(report.servers[0].checks["config"].ok);
    assert!(report.servers[0].overall_ok);
    assert!(report.servers[2].overall_ok);
}

#[tokio::test]
async fn test_counter_timeout_is_bounded() {
    let servers = mock_servers();
    let backends = mock_backends().with_counters(Arc::new(
        MockCounterClient::new()
            .hang_host("10.10.10.10")
            .hang_host("10.10.10.11"),
    ));
    let config = EngineConfig {
        counter_timeout_ms: 200,
        ..Default::default()
    };
    let engine = build_engine(servers, backends, config);

    let start = Instant::now();
    let report = engine.cluster_health(&TenantScope::All).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    for server in &report.servers[..2] {
        let counters = &server.checks["counters"];
        assert!(!counters.ok);
        assert_eq!(counters.error_kind, ProbeErrorKind::Timeout);
    }
}

#[tokio::test]
async fn test_overall_ok_implies_all_applicable_ok() {
    let servers = mock_servers();
    let backends = mock_backends().with_realtime(Arc::new(
        MockRealtimeClient::new().delay_host("10.10.10.11", Duration::from_millis(20)),
    ));
    let engine = build_engine(servers, backends, EngineConfig::default());

    let report = engine.cluster_health(&TenantScope::All).await.unwrap();
    for server in &report.servers {
        if server.overall_ok {
            assert!(!server.applicable.is_empty());
            assert!(server.checks.values().all(|r| r.ok));
        }
    }
}

#[tokio::test]
async fn test_cluster_summary_is_idempotent() {
    let engine = build_engine(mock_servers(), mock_backends(), EngineConfig::default());

    let first = engine.cluster_summary(&TenantScope::All).await.unwrap();
    let second = engine.cluster_summary(&TenantScope::All).await.unwrap();
    assert_eq!(first.devices, second.devices);
    assert_eq!(first.registration, second.registration);
    assert_eq!(first.source_host.as_deref(), Some("10.10.10.10"));
}

#[tokio::test]
async fn test_summary_queries_each_backend_once() {
    let config_client = Arc::new(MockConfigClient::new());
    let realtime_client = Arc::new(MockRealtimeClient::new());
    let backends = BackendSet::new()
        .with_config(config_client.clone())
        .with_realtime(realtime_client.clone());
    let engine = build_engine(mock_servers(), backends, EngineConfig::default());

    let summary = engine.cluster_summary(&TenantScope::All).await.unwrap();
    assert_eq!(config_client.calls(), 1);
    assert_eq!(realtime_client.calls(), 1);
    assert!(!summary.performance.is_available());
}

#[tokio::test]
async fn test_unknown_server_is_not_found() {
    let engine = build_engine(mock_servers(), mock_backends(), EngineConfig::default());
    let missing = ServerId::from_u128(0xdead);
    assert!(matches!(
        engine.server_health(missing).await,
        Err(HealthError::NotFound(id)) if id == missing
    ));
}

fn cucm_fleet(count: u128, host: &str) -> Vec<ServerRecord> {
    let template = mock_servers().remove(0);
    (0..count)
        .map(|i| ServerRecord {
            id: ServerId::from_u128(0x100 + i),
            name: format!("cucm-{}", i),
            mgmt_address: Some(host.to_string()),
            ports: Some(vec![]),
            ..template.clone()
        })
        .collect()
}

#[tokio::test]
async fn test_request_deadline_still_returns_every_server() {
    // one slot, 100 ms per hung config check, 300 ms for the whole request:
    // not every server can finish in time
    let servers = cucm_fleet(4, "10.10.10.10");
    let backends = mock_backends().with_config(Arc::new(MockConfigClient::new().hang_host("10.10.10.10")));
    let config = EngineConfig {
        config_timeout_ms: 100,
        request_timeout_ms: 300,
        max_concurrency: 1,
        ..Default::default()
    };
    let engine = build_engine(servers.clone(), backends, config);

    let start = Instant::now();
    let report = engine.cluster_health(&TenantScope::All).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(report.total, 4);
    assert_eq!(report.unhealthy, 4);
    let ids: Vec<ServerId> = report.servers.iter().map(|s| s.server.id).collect();
    assert_eq!(ids, servers.iter().map(|s| s.id).collect::<Vec<_>>());
    for server in &report.servers {
        assert!(!server.overall_ok);
        assert_eq!(server.checks["config"].error_kind, ProbeErrorKind::Timeout);
    }
}

#[tokio::test]
async fn test_request_deadline_on_single_server() {
    let servers = cucm_fleet(1, "10.10.10.10");
    let id = servers[0].id;
    let backends = mock_backends().with_config(Arc::new(MockConfigClient::new().hang_host("10.10.10.10")));
    let config = EngineConfig {
        request_timeout_ms: 100,
        ..Default::default()
    };
    let engine = build_engine(servers, backends, config);

    let start = Instant::now();
    let result = engine.server_health(id).await;
    assert!(matches!(result, Err(HealthError::DeadlineExceeded(_))));
    assert!(start.elapsed() < Duration::from_secs(1));
}

// Directory that counts how often it is listed
struct CountingDirectory {
    inner: StaticDirectory,
    listings: AtomicUsize,
}

#[async_trait]
impl ServerDirectory for CountingDirectory {
    async fn list_enabled_servers(&self, scope: &TenantScope) -> Result<Vec<ServerRecord>, HealthError> {
        self.listings.fetch_add(1, Ordering::Relaxed);
        self.inner.list_enabled_servers(scope).await
    }

    async fn get_server(&self, id: ServerId) -> Result<Option<ServerRecord>, HealthError> {
        self.inner.get_server(id).await
    }
}

#[tokio::test]
async fn test_cluster_host_looked_up_once() {
    let directory = Arc::new(CountingDirectory {
        inner: StaticDirectory::new(mock_servers()),
        listings: AtomicUsize::new(0),
    });
    let engine = StatusEngine::with_connector(
        directory.clone(),
        mock_backends(),
        EngineConfig::default(),
        Arc::new(FakePorts::all_open(&mock_servers())),
    );

    let status = engine.backend_status().await;
    assert_eq!(status.host.as_deref(), Some("10.10.10.10"));
    assert!(engine.readiness().await.ok);
    engine
        .invoke_raw(Backend::Config, "getCCMVersion", serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(directory.listings.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_backend_status_ignores_unwired_backends() {
    let backends = BackendSet::new()
        .with_config(Arc::new(MockConfigClient::new()))
        .with_realtime(Arc::new(MockRealtimeClient::new()));
    let engine = build_engine(mock_servers(), backends, EngineConfig::default());

    let status = engine.backend_status().await;
    assert!(status.overall_ok);
    assert_eq!(status.checks["counters"].error_kind, ProbeErrorKind::NotConfigured);
    assert!(engine.readiness().await.ok);
}

#[tokio::test]
async fn test_snapshot_written_back() {
    let directory = Arc::new(StaticDirectory::new(mock_servers()));
    let engine = StatusEngine::with_connector(
        directory.clone(),
        mock_backends(),
        EngineConfig::default(),
        Arc::new(FakePorts::all_open(&mock_servers())),
    );

    let id = mock_servers()[0].id;
    let health = engine.server_health(id).await.unwrap();
    directory.record_health(health.snapshot()).await.unwrap();

    let stored = directory.last_health(id).unwrap();
    assert_eq!(stored.status, HealthStatus::Up);
}

#[tokio::test]
async fn test_raw_invoke_routes_to_backend() {
    let engine = build_engine(mock_servers(), mock_backends(), EngineConfig::default());
    let value = engine
        .invoke_raw(Backend::Realtime, "selectCmDevice", serde_json::json!({ "maxReturnedDevices": 5 }))
        .await
        .unwrap();
    assert_eq!(value["backend"], "realtime");
    assert_eq!(value["operation"], "selectCmDevice");
    assert_eq!(value["params"]["maxReturnedDevices"], 5);

    let unwired = StatusEngine::with_connector(
        Arc::new(StaticDirectory::new(mock_servers())),
        BackendSet::new(),
        EngineConfig::default(),
        Arc::new(FakePorts::all_open(&[])),
    );
    let err = unwired
        .invoke_raw(Backend::Counters, "listCounters", serde_json::Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ProbeErrorKind::NotConfigured);
}
