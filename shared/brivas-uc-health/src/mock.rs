//! Mock backends and inventory
//!
//! Canned lab-cluster data served through the same client traits as the
//! live adapters, with per-host fault injection for tests and demos.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brivas_core::{ServerId, TenantId};
use serde_json::{json, Value};

use crate::backend::{
    BackendError, BackendSet, ConfigClient, ConfigPayload, ConfiguredDevice, CounterClient,
    DeviceClass, DeviceQuery, DeviceState, InventoryCounts, ProcessNode, RealtimeClient,
    RegistrationStatus,
};
use crate::types::{ServerRecord, ServerType};

pub const MOCK_VERSION: &str = "14.0(1)";
pub const MOCK_TENANT: TenantId = TenantId::from_u128(0x7e0a_0001);

/// What a mock does when called for a host
#[derive(Debug, Clone)]
pub enum MockFault {
    Error(BackendError),
    Delay(Duration),
    Hang,
}

#[derive(Debug, Default)]
struct FaultPlan {
    per_host: HashMap<String, MockFault>,
    all: Option<MockFault>,
    calls: AtomicUsize,
}

impl FaultPlan {
    async fn apply(&self, host: &str) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.per_host.get(host).or(self.all.as_ref()) {
            None => Ok(()),
            Some(MockFault::Error(err)) => Err(err.clone()),
            Some(MockFault::Delay(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            Some(MockFault::Hang) => std::future::pending().await,
        }
    }
}

macro_rules! fault_builders {
    ($client:ty) => {
        impl $client {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn fail_host(mut self, host: &str, err: BackendError) -> Self {
                self.faults.per_host.insert(host.to_string(), MockFault::Error(err));
                self
            }

            pub fn delay_host(mut self, host: &str, delay: Duration) -> Self {
                self.faults.per_host.insert(host.to_string(), MockFault::Delay(delay));
                self
            }

            pub fn hang_host(mut self, host: &str) -> Self {
                self.faults.per_host.insert(host.to_string(), MockFault::Hang);
                self
            }

            pub fn fail_all(mut self, err: BackendError) -> Self {
                self.faults.all = Some(MockFault::Error(err));
                self
            }

            /// Calls received so far, faulted or not
            pub fn calls(&self) -> usize {
                self.faults.calls.load(Ordering::Relaxed)
            }
        }
    };
}

fn echo(backend: &str, host: &str, operation: &str, params: Value) -> Value {
    json!({
        "mock": true,
        "backend": backend,
        "host": host,
        "operation": operation,
        "params": params,
    })
}

/// Case-insensitive SQL `LIKE` with `%` wildcards only
fn like(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let name = name.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name.as_str();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if i == last {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn nodes() -> Vec<ProcessNode> {
    vec![
        ProcessNode {
            name: "CUCM-PUB".into(),
            description: Some("Publisher".into()),
            ipv4_address: Some("10.10.10.10".into()),
            role: Some("publisher".into()),
        },
        ProcessNode {
            name: "CUCM-SUB1".into(),
            description: Some("Subscriber 1".into()),
            ipv4_address: Some("10.10.10.11".into()),
            role: Some("subscriber".into()),
        },
    ]
}

struct CannedDevice {
    name: &'static str,
    class: DeviceClass,
    pool: &'static str,
    model: &'static str,
    status: RegistrationStatus,
    node: &'static str,
    ip: Option<&'static str>,
    protocol: &'static str,
}

const DEVICES: &[CannedDevice] = &[
    CannedDevice {
        name: "SEP001122334455",
        class: DeviceClass::Phone,
        pool: "DP-HQ",
        model: "Cisco 8841",
        status: RegistrationStatus::Registered,
        node: "CUCM-PUB",
        ip: Some("10.10.20.15"),
        protocol: "SIP",
    },
    CannedDevice {
        name: "SEP667788990000",
        class: DeviceClass::Phone,
        pool: "DP-BR1",
        model: "Cisco 8861",
        status: RegistrationStatus::Unregistered,
        node: "CUCM-SUB1",
        ip: None,
        protocol: "SIP",
    },
    CannedDevice {
        name: "CSFTEST01",
        class: DeviceClass::Phone,
        pool: "DP-REMOTE",
        model: "Cisco Unified Client Services Framework",
        status: RegistrationStatus::Registered,
        node: "CUCM-PUB",
        ip: Some("10.10.30.50"),
        protocol: "SIP",
    },
    CannedDevice {
        name: "SIP_ITSP_PRIMARY",
        class: DeviceClass::SipTrunk,
        pool: "DP-HQ",
        model: "SIP Trunk",
        status: RegistrationStatus::Registered,
        node: "CUCM-PUB",
        ip: Some("203.0.113.10"),
        protocol: "SIP",
    },
];

#[derive(Debug, Default)]
pub struct MockConfigClient {
    faults: FaultPlan,
}

fault_builders!(MockConfigClient);

#[async_trait]
impl ConfigClient for MockConfigClient {
    async fn version(&self, host: &str) -> Result<String, BackendError> {
        self.faults.apply(host).await?;
        Ok(MOCK_VERSION.to_string())
    }

    async fn config_summary(&self, host: &str) -> Result<ConfigPayload, BackendError> {
        self.faults.apply(host).await?;
        let devices: Vec<ConfiguredDevice> = DEVICES
            .iter()
            .map(|d| ConfiguredDevice {
                name: d.name.to_string(),
                device_class: d.class,
                device_pool: Some(d.pool.to_string()),
                model: Some(d.model.to_string()),
            })
            .collect();
        Ok(ConfigPayload {
            version: MOCK_VERSION.to_string(),
            counts: InventoryCounts {
                users: 3,
                devices: devices.len() as u64,
                trunks: devices
                    .iter()
                    .filter(|d| matches!(d.device_class, DeviceClass::SipTrunk | DeviceClass::H323))
                    .count() as u64,
            },
            nodes: nodes(),
            devices,
        })
    }

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError> {
        self.faults.apply(host).await?;
        Ok(echo("config", host, operation, params))
    }
}

#[derive(Debug, Default)]
pub struct MockRealtimeClient {
    faults: FaultPlan,
}

fault_builders!(MockRealtimeClient);

#[async_trait]
impl RealtimeClient for MockRealtimeClient {
    async fn registered_devices(
        &self,
        host: &str,
        query: &DeviceQuery,
    ) -> Result<Vec<DeviceState>, BackendError> {
        self.faults.apply(host).await?;
        Ok(DEVICES
            .iter()
            .filter(|d| query.class == DeviceClass::Any || query.class == d.class)
            .filter(|d| like(&query.pattern, d.name))
            .take(query.limit as usize)
            .map(|d| DeviceState {
                name: d.name.to_string(),
                device_class: d.class,
                status: d.status,
                node: Some(d.node.to_string()),
                ip_address: d.ip.map(str::to_string),
                model: Some(d.model.to_string()),
                protocol: Some(d.protocol.to_string()),
            })
            .collect())
    }

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError> {
        self.faults.apply(host).await?;
        Ok(echo("realtime", host, operation, params))
    }
}

#[derive(Debug, Default)]
pub struct MockCounterClient {
    faults: FaultPlan,
}

fault_builders!(MockCounterClient);

fn canned_counter(name: &str) -> Option<f64> {
    match name {
        r"Cisco CallManager\CallsActive" => Some(12.0),
        r"Processor(_Total)\% CPU Time" => Some(17.5),
        r"Memory\% Mem Used" => Some(41.0),
        r"System\Processor Queue Length" => Some(0.0),
        _ => None,
    }
}

#[async_trait]
impl CounterClient for MockCounterClient {
    async fn sample_counters(
        &self,
        host: &str,
        _node: &str,
        counters: &[String],
    ) -> Result<BTreeMap<String, f64>, BackendError> {
        self.faults.apply(host).await?;
        counters
            .iter()
            .map(|name| {
                canned_counter(name)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| BackendError::Fault(format!("unknown counter '{}'", name)))
            })
            .collect()
    }

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError> {
        self.faults.apply(host).await?;
        Ok(echo("counters", host, operation, params))
    }
}

/// All three mock clients, fault-free
pub fn mock_backends() -> BackendSet {
    BackendSet::new()
        .with_config(Arc::new(MockConfigClient::new()))
        .with_realtime(Arc::new(MockRealtimeClient::new()))
        .with_counters(Arc::new(MockCounterClient::new()))
}

/// Lab inventory: a two-node CUCM cluster plus a Unity Connection server
pub fn mock_servers() -> Vec<ServerRecord> {
    let server = |id: u128, name: &str, mgmt: Option<&str>, server_type: ServerType| ServerRecord {
        id: ServerId::from_u128(id),
        tenant_id: MOCK_TENANT,
        name: name.to_string(),
        fqdn: format!("{}.lab.local", name),
        mgmt_address: mgmt.map(str::to_string),
        server_type,
        enabled: true,
        ports: None,
        cluster_name: Some("Cluster-A".to_string()),
    };

    vec![
        server(0x5e_0001, "cucm-pub", Some("10.10.10.10"), ServerType::Cucm),
        server(0x5e_0002, "cucm-sub1", Some("10.10.10.11"), ServerType::Cucm),
        server(0x5e_0003, "cucx-ucxn", None, ServerType::Unity),
    ]
}
