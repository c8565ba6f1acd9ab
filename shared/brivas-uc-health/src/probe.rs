//! Backend probes
//!
//! A probe is one bounded call used purely to decide whether a surface
//! answers. Probes never fail across this boundary: errors, timeouts and
//! panics in the underlying client all come back as a failed
//! [`ProbeResult`] carrying the elapsed wall-clock latency.

use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{json, Map, Value};
use tokio::net::TcpStream;

use crate::backend::{
    BackendError, BackendSet, ConfigClient, CounterClient, DeviceQuery, RealtimeClient,
    QUEUE_LENGTH_COUNTER,
};
use crate::types::{millis, CheckKind, ProbeErrorKind, ProbeResult};

/// Where a probe is aimed
#[derive(Debug, Clone, Copy)]
pub struct ProbeTarget<'a> {
    /// Address the connection goes to
    pub host: &'a str,
    /// Node name the counter API expects
    pub node: &'a str,
}

impl<'a> ProbeTarget<'a> {
    pub fn new(host: &'a str, node: &'a str) -> Self {
        Self { host, node }
    }

    /// Same value for host and node, used when probing a bare host
    pub fn host(host: &'a str) -> Self {
        Self { host, node: host }
    }
}

/// Uniform probe contract over every check kind
#[async_trait]
pub trait BackendProbe: Send + Sync {
    fn check(&self) -> CheckKind;

    async fn probe(&self, target: ProbeTarget<'_>, timeout: Duration) -> ProbeResult;
}

/// Run `fut` under `timeout`, turning expiry into [`BackendError::Timeout`]
/// and a panic into [`BackendError::Other`]. Dropping the returned future
/// cancels the in-flight call.
pub(crate) async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(BackendError::Other("backend client panicked".to_string())),
        Err(_) => Err(BackendError::Timeout),
    }
}

/// Time a bounded call and fold its outcome into a [`ProbeResult`]
pub(crate) async fn measure<T, F>(
    timeout: Duration,
    fut: F,
    payload: impl FnOnce(T) -> Map<String, Value>,
) -> ProbeResult
where
    F: Future<Output = Result<T, BackendError>>,
{
    let start = Instant::now();
    let outcome = bounded(timeout, fut).await;
    let latency = start.elapsed();

    match outcome {
        Ok(value) => ProbeResult::success(latency, payload(value)),
        Err(BackendError::Timeout) => ProbeResult::failure(
            ProbeErrorKind::Timeout,
            format!("no response within {} ms", millis(timeout)),
            latency,
        ),
        Err(err) => ProbeResult::failure(err.kind(), err.to_string(), latency),
    }
}

fn not_configured(check: CheckKind) -> ProbeResult {
    ProbeResult::failure(
        ProbeErrorKind::NotConfigured,
        format!("no {} client configured", check.family()),
        Duration::ZERO,
    )
}

pub(crate) fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Version query against the configuration API
pub struct ConfigProbe {
    client: Option<Arc<dyn ConfigClient>>,
}

impl ConfigProbe {
    pub fn new(client: Option<Arc<dyn ConfigClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendProbe for ConfigProbe {
    fn check(&self) -> CheckKind {
        CheckKind::Config
    }

    async fn probe(&self, target: ProbeTarget<'_>, timeout: Duration) -> ProbeResult {
        let Some(client) = &self.client else {
            return not_configured(self.check());
        };
        measure(timeout, client.version(target.host), |version| {
            object(json!({ "version": version }))
        })
        .await
    }
}

/// At-most-one-phone registration query
pub struct RealtimeProbe {
    client: Option<Arc<dyn RealtimeClient>>,
}

impl RealtimeProbe {
    pub fn new(client: Option<Arc<dyn RealtimeClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendProbe for RealtimeProbe {
    fn check(&self) -> CheckKind {
        CheckKind::Realtime
    }

    async fn probe(&self, target: ProbeTarget<'_>, timeout: Duration) -> ProbeResult {
        let Some(client) = &self.client else {
            return not_configured(self.check());
        };
        let query = DeviceQuery::liveness();
        measure(timeout, client.registered_devices(target.host, &query), |devices| {
            object(json!({ "devicesReturned": devices.len() }))
        })
        .await
    }
}

/// Single cheap counter sampled from the target node
pub struct CounterProbe {
    client: Option<Arc<dyn CounterClient>>,
}

impl CounterProbe {
    pub fn new(client: Option<Arc<dyn CounterClient>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendProbe for CounterProbe {
    fn check(&self) -> CheckKind {
        CheckKind::Counters
    }

    async fn probe(&self, target: ProbeTarget<'_>, timeout: Duration) -> ProbeResult {
        let Some(client) = &self.client else {
            return not_configured(self.check());
        };
        let names = [QUEUE_LENGTH_COUNTER.to_string()];
        let node = target.node.to_string();
        measure(
            timeout,
            client.sample_counters(target.host, target.node, &names),
            move |counters| object(json!({ "node": node, "counters": counters })),
        )
        .await
    }
}

/// Opens TCP connections for port checks
#[async_trait]
pub trait PortConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> io::Result<()>;
}

/// Plain tokio connector; the stream is dropped as soon as it is established
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl PortConnector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<()> {
        TcpStream::connect((host, port)).await.map(drop)
    }
}

/// TCP reachability of one port
pub struct TcpProbe {
    port: u16,
    connector: Arc<dyn PortConnector>,
}

impl TcpProbe {
    pub fn new(port: u16, connector: Arc<dyn PortConnector>) -> Self {
        Self { port, connector }
    }
}

#[async_trait]
impl BackendProbe for TcpProbe {
    fn check(&self) -> CheckKind {
        CheckKind::Tcp(self.port)
    }

    async fn probe(&self, target: ProbeTarget<'_>, timeout: Duration) -> ProbeResult {
        let host = target.host.to_string();
        let port = self.port;
        let connect = async {
            self.connector
                .connect(target.host, port)
                .await
                .map_err(BackendError::from)
        };
        measure(timeout, connect, move |()| object(json!({ "host": host, "port": port }))).await
    }
}

/// One probe per protocol surface plus the connector for port checks
#[derive(Clone)]
pub struct ProbeSet {
    config: Arc<dyn BackendProbe>,
    realtime: Arc<dyn BackendProbe>,
    counters: Arc<dyn BackendProbe>,
    connector: Arc<dyn PortConnector>,
}

impl ProbeSet {
    pub fn new(backends: &BackendSet, connector: Arc<dyn PortConnector>) -> Self {
        Self {
            config: Arc::new(ConfigProbe::new(backends.config.clone())),
            realtime: Arc::new(RealtimeProbe::new(backends.realtime.clone())),
            counters: Arc::new(CounterProbe::new(backends.counters.clone())),
            connector,
        }
    }

    pub fn for_check(&self, check: CheckKind) -> Arc<dyn BackendProbe> {
        match check {
            CheckKind::Tcp(port) => Arc::new(TcpProbe::new(port, self.connector.clone())),
            CheckKind::Config => self.config.clone(),
            CheckKind::Realtime => self.realtime.clone(),
            CheckKind::Counters => self.counters.clone(),
        }
    }
}
