//! Cluster-wide rollup
//!
//! Pulls the full inventory from the configuration API and the full
//! registration state from the real-time API (once each, concurrently) and
//! groups them by device pool, device class and node. Every section is
//! either available or carries an explicit unavailable marker; nothing is
//! silently omitted. Answers capped by `rollup_device_limit` are flagged
//! `truncated`. Maps are ordered so identical upstream data always yields
//! identical output.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{
    Backend, BackendError, BackendSet, ConfigPayload, ConfiguredDevice, DeviceQuery, DeviceState,
    InventoryCounts, ProcessNode, RegistrationStatus, BASIC_NODE_COUNTERS,
};
use crate::config::EngineConfig;
use crate::probe::{bounded, measure, object};
use crate::types::{ProbeErrorKind, ProbeResult};

/// Key used when a device has no pool or node
const UNASSIGNED: &str = "(none)";

/// One rollup section: data, or the reason it is missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Section<T> {
    Available {
        data: T,
    },
    Unavailable {
        #[serde(rename = "errorKind")]
        error_kind: ProbeErrorKind,
        message: String,
    },
}

impl<T> Section<T> {
    pub fn unavailable(kind: ProbeErrorKind, message: impl Into<String>) -> Self {
        Self::Unavailable {
            error_kind: kind,
            message: message.into(),
        }
    }

    pub fn from_error(backend: Backend, err: &BackendError) -> Self {
        Self::unavailable(err.kind(), format!("{} backend: {}", backend, err))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Available { data } => Some(data),
            Self::Unavailable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub version: String,
    pub counts: InventoryCounts,
    pub nodes: Vec<ProcessNode>,
}

/// Per-key device totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub key: String,
    pub total: u64,
    pub registered: u64,
    pub unregistered: u64,
}

impl Bucket {
    fn count(&mut self, status: RegistrationStatus) {
        self.total += 1;
        if status == RegistrationStatus::Registered {
            self.registered += 1;
        } else {
            self.unregistered += 1;
        }
    }
}

/// Gateway and trunk registration counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrunkSummary {
    pub total: u64,
    pub up: u64,
    pub down: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSummary {
    pub total: u64,
    pub registered: u64,
    pub unregistered: u64,
    pub by_class: Vec<Bucket>,
    pub by_node: Vec<Bucket>,
    pub trunks: TrunkSummary,
    /// The live answer hit the device limit; more devices may exist
    pub truncated: bool,
}

/// Configured devices joined with their live state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBuckets {
    pub by_pool: Vec<Bucket>,
    pub by_class: Vec<Bucket>,
    /// Either side of the join hit the device limit
    pub truncated: bool,
    /// Configured devices left out because the capped live answer did not
    /// cover them
    pub unmatched: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePerformance {
    pub node: String,
    pub sample: ProbeResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub generated_at: DateTime<Utc>,
    pub source_host: Option<String>,
    pub inventory: Section<InventorySummary>,
    pub registration: Section<RegistrationSummary>,
    pub devices: Section<DeviceBuckets>,
    pub performance: Section<Vec<NodePerformance>>,
}

impl ClusterSummary {
    /// Every section unavailable for the same reason
    pub fn unavailable(kind: ProbeErrorKind, message: &str) -> Self {
        Self {
            generated_at: Utc::now(),
            source_host: None,
            inventory: Section::unavailable(kind, message),
            registration: Section::unavailable(kind, message),
            devices: Section::unavailable(kind, message),
            performance: Section::unavailable(kind, message),
        }
    }
}

fn into_buckets(map: BTreeMap<String, Bucket>) -> Vec<Bucket> {
    map.into_iter()
        .map(|(key, mut bucket)| {
            bucket.key = key;
            bucket
        })
        .collect()
}

fn bucket_for<'a>(map: &'a mut BTreeMap<String, Bucket>, key: &str) -> &'a mut Bucket {
    map.entry(key.to_string()).or_default()
}

fn status_rank(status: RegistrationStatus) -> u8 {
    match status {
        RegistrationStatus::Registered => 4,
        RegistrationStatus::PartiallyRegistered => 3,
        RegistrationStatus::Unregistered => 2,
        RegistrationStatus::Rejected => 1,
        RegistrationStatus::Unknown => 0,
    }
}

/// One state per device name, keeping the best status.
///
/// The real-time API answers per node, so a device that moved between
/// nodes is listed once for each. First-seen order is kept.
pub fn collapse_by_name(states: &[DeviceState]) -> Vec<DeviceState> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<DeviceState> = Vec::with_capacity(states.len());

    for state in states {
        match index.get(state.name.as_str()) {
            Some(&at) => {
                if status_rank(state.status) > status_rank(unique[at].status) {
                    unique[at] = state.clone();
                }
            }
            None => {
                index.insert(state.name.as_str(), unique.len());
                unique.push(state.clone());
            }
        }
    }
    unique
}

/// Group live registration state by class and node, one count per device
pub fn registration_summary(states: &[DeviceState]) -> RegistrationSummary {
    let mut by_class = BTreeMap::new();
    let mut by_node = BTreeMap::new();
    let mut summary = RegistrationSummary::default();

    for state in &collapse_by_name(states) {
        summary.total += 1;
        if state.status == RegistrationStatus::Registered {
            summary.registered += 1;
        } else {
            summary.unregistered += 1;
        }

        bucket_for(&mut by_class, state.device_class.as_str()).count(state.status);
        let node = state.node.as_deref().unwrap_or(UNASSIGNED);
        bucket_for(&mut by_node, node).count(state.status);

        if state.device_class.is_trunk() {
            summary.trunks.total += 1;
            match state.status {
                RegistrationStatus::Registered => summary.trunks.up += 1,
                RegistrationStatus::Unregistered
                | RegistrationStatus::Rejected
                | RegistrationStatus::Unknown => summary.trunks.down += 1,
                RegistrationStatus::PartiallyRegistered => summary.trunks.other += 1,
            }
        }
    }

    summary.by_class = into_buckets(by_class);
    summary.by_node = into_buckets(by_node);
    summary
}

/// Group configured devices by pool and class, counting each as registered
/// when the real-time API reports it so.
///
/// With a complete live answer, devices absent from it count as
/// unregistered. With a capped one (`live_complete == false`) their state is
/// unknown, so they are left out of the buckets and counted in `unmatched`.
pub fn device_buckets(devices: &[ConfiguredDevice], states: &[DeviceState], live_complete: bool) -> DeviceBuckets {
    let collapsed = collapse_by_name(states);
    let live: HashMap<&str, RegistrationStatus> =
        collapsed.iter().map(|s| (s.name.as_str(), s.status)).collect();

    let mut buckets = DeviceBuckets {
        truncated: !live_complete,
        ..Default::default()
    };
    let mut by_pool = BTreeMap::new();
    let mut by_class = BTreeMap::new();
    for device in devices {
        let status = match live.get(device.name.as_str()) {
            Some(status) => *status,
            None if live_complete => RegistrationStatus::Unregistered,
            None => {
                buckets.unmatched += 1;
                continue;
            }
        };
        let pool = device.device_pool.as_deref().unwrap_or(UNASSIGNED);
        bucket_for(&mut by_pool, pool).count(status);
        bucket_for(&mut by_class, device.device_class.as_str()).count(status);
    }

    buckets.by_pool = into_buckets(by_pool);
    buckets.by_class = into_buckets(by_class);
    buckets
}

/// Whether a capped answer of `returned` rows may have left rows out
fn hit_limit(returned: usize, limit: u32) -> bool {
    returned >= limit as usize
}

/// Computes [`ClusterSummary`] against one host
#[derive(Clone)]
pub struct Rollup {
    backends: BackendSet,
    config: Arc<EngineConfig>,
}

impl Rollup {
    pub fn new(backends: BackendSet, config: Arc<EngineConfig>) -> Self {
        Self { backends, config }
    }

    pub async fn summarize(&self, host: Option<&str>) -> ClusterSummary {
        let Some(host) = host else {
            return ClusterSummary::unavailable(
                ProbeErrorKind::NotConfigured,
                "no host available for cluster queries",
            );
        };

        let (inventory, registration) = tokio::join!(self.fetch_inventory(host), self.fetch_registration(host));

        let live_complete = match &registration {
            Ok(states) => !hit_limit(states.len(), self.config.rollup_device_limit),
            Err(_) => false,
        };
        if !live_complete && registration.is_ok() {
            tracing::warn!(
                host = %host,
                limit = self.config.rollup_device_limit,
                "Registration answer reached the device limit; rollup is partial"
            );
        }

        let devices = match (&inventory, &registration) {
            (Ok(config), Ok(states)) => {
                let mut data = device_buckets(&config.devices, states, live_complete);
                // the configured list is capped too; its full size is in the counts
                data.truncated |= (config.devices.len() as u64) < config.counts.devices;
                Section::Available { data }
            }
            (Err(err), _) => Section::from_error(Backend::Config, err),
            (_, Err(err)) => Section::from_error(Backend::Realtime, err),
        };

        let performance = match &inventory {
            Ok(config) => self.sample_nodes(host, &config.nodes).await,
            Err(err) => Section::from_error(Backend::Config, err),
        };

        let summary = ClusterSummary {
            generated_at: Utc::now(),
            source_host: Some(host.to_string()),
            inventory: match inventory {
                Ok(config) => Section::Available {
                    data: InventorySummary {
                        version: config.version,
                        counts: config.counts,
                        nodes: config.nodes,
                    },
                },
                Err(err) => Section::from_error(Backend::Config, &err),
            },
            registration: match registration {
                Ok(states) => Section::Available {
                    data: RegistrationSummary {
                        truncated: !live_complete,
                        ..registration_summary(&states)
                    },
                },
                Err(err) => Section::from_error(Backend::Realtime, &err),
            },
            devices,
            performance,
        };

        tracing::info!(
            host = %host,
            inventory = summary.inventory.is_available(),
            registration = summary.registration.is_available(),
            performance = summary.performance.is_available(),
            "Cluster summary computed"
        );

        summary
    }

    async fn fetch_inventory(&self, host: &str) -> Result<ConfigPayload, BackendError> {
        let client = self
            .backends
            .config
            .as_ref()
            .ok_or_else(|| BackendError::NotConfigured("no config client configured".to_string()))?;
        let result = bounded(
            self.config.backend_timeout(Backend::Config),
            client.config_summary(host),
        )
        .await;
        if let Err(err) = &result {
            tracing::warn!(host = %host, error = %err, "Inventory query failed");
        }
        result
    }

    async fn fetch_registration(&self, host: &str) -> Result<Vec<DeviceState>, BackendError> {
        let client = self
            .backends
            .realtime
            .as_ref()
            .ok_or_else(|| BackendError::NotConfigured("no realtime client configured".to_string()))?;
        let query = DeviceQuery::all(self.config.rollup_device_limit);
        let result = bounded(
            self.config.backend_timeout(Backend::Realtime),
            client.registered_devices(host, &query),
        )
        .await;
        if let Err(err) = &result {
            tracing::warn!(host = %host, error = %err, "Registration query failed");
        }
        result
    }

    async fn sample_nodes(&self, host: &str, nodes: &[ProcessNode]) -> Section<Vec<NodePerformance>> {
        let Some(client) = self.backends.counters.clone() else {
            return Section::unavailable(ProbeErrorKind::NotConfigured, "no counters client configured");
        };
        let timeout = self.config.backend_timeout(Backend::Counters);
        let names: Vec<String> = BASIC_NODE_COUNTERS.iter().map(|c| c.to_string()).collect();

        let samples = stream::iter((0..nodes.len()).map(|i| {
                let node = &nodes[i];
                let client = client.clone();
                let names = &names;
                let target = node.ipv4_address.as_deref().unwrap_or(host);
                async move {
                    let sample = measure(
                        timeout,
                        client.sample_counters(target, &node.name, names),
                        |counters| object(json!({ "counters": counters })),
                    )
                    .await;
                    NodePerformance {
                        node: node.name.clone(),
                        sample,
                    }
                }
            }))
            .buffered(self.config.concurrency())
            .collect::<Vec<_>>()
            .await;

        Section::Available { data: samples }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceClass;
    use crate::mock::{mock_backends, MockConfigClient, MockRealtimeClient};

    fn state(name: &str, class: DeviceClass, status: RegistrationStatus, node: Option<&str>) -> DeviceState {
        DeviceState {
            name: name.to_string(),
            device_class: class,
            status,
            node: node.map(str::to_string),
            ip_address: None,
            model: None,
            protocol: None,
        }
    }

    #[test]
    fn test_registration_grouping() {
        let states = vec![
            state("SEP1", DeviceClass::Phone, RegistrationStatus::Registered, Some("CUCM-PUB")),
            state("SEP2", DeviceClass::Phone, RegistrationStatus::Unregistered, Some("CUCM-SUB1")),
            state("GW1", DeviceClass::Gateway, RegistrationStatus::Rejected, None),
            state("TRK1", DeviceClass::SipTrunk, RegistrationStatus::Registered, Some("CUCM-PUB")),
        ];
        let summary = registration_summary(&states);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.registered, 2);
        assert_eq!(summary.unregistered, 2);
        assert_eq!(summary.trunks, TrunkSummary { total: 2, up: 1, down: 1, other: 0 });

        let keys: Vec<&str> = summary.by_node.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["(none)", "CUCM-PUB", "CUCM-SUB1"]);
        let phones = summary.by_class.iter().find(|b| b.key == "Phone").unwrap();
        assert_eq!((phones.total, phones.registered, phones.unregistered), (2, 1, 1));
    }

    #[test]
    fn test_device_buckets_join_by_name() {
        let devices = vec![
            ConfiguredDevice {
                name: "SEP1".into(),
                device_class: DeviceClass::Phone,
                device_pool: Some("DP-HQ".into()),
                model: None,
            },
            ConfiguredDevice {
                name: "SEP9".into(),
                device_class: DeviceClass::Phone,
                device_pool: Some("DP-HQ".into()),
                model: None,
            },
        ];
        let states = vec![state("SEP1", DeviceClass::Phone, RegistrationStatus::Registered, None)];

        let buckets = device_buckets(&devices, &states, true);
        assert_eq!(
            buckets.by_pool,
            vec![Bucket {
                key: "DP-HQ".into(),
                total: 2,
                registered: 1,
                unregistered: 1
            }]
        );
        assert!(!buckets.truncated);
        assert_eq!(buckets.unmatched, 0);

        // a capped live answer says nothing about SEP9
        let buckets = device_buckets(&devices, &states, false);
        assert_eq!(buckets.by_pool[0].total, 1);
        assert_eq!(buckets.by_pool[0].unregistered, 0);
        assert!(buckets.truncated);
        assert_eq!(buckets.unmatched, 1);
    }

    #[test]
    fn test_device_listed_by_two_nodes_counts_once() {
        let states = vec![
            state("SEP1", DeviceClass::Phone, RegistrationStatus::Unregistered, Some("CUCM-SUB1")),
            state("SEP1", DeviceClass::Phone, RegistrationStatus::Registered, Some("CUCM-PUB")),
            state("SEP2", DeviceClass::Phone, RegistrationStatus::Unregistered, Some("CUCM-SUB1")),
        ];

        let collapsed = collapse_by_name(&states);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].name, "SEP1");
        assert_eq!(collapsed[0].node.as_deref(), Some("CUCM-PUB"));

        let summary = registration_summary(&states);
        assert_eq!((summary.total, summary.registered, summary.unregistered), (2, 1, 1));
        let pub_node = summary.by_node.iter().find(|b| b.key == "CUCM-PUB").unwrap();
        assert_eq!(pub_node.total, 1);

        let devices = vec![ConfiguredDevice {
            name: "SEP1".into(),
            device_class: DeviceClass::Phone,
            device_pool: Some("DP-HQ".into()),
            model: None,
        }];
        let buckets = device_buckets(&devices, &states, true);
        assert_eq!(
            buckets.by_pool,
            vec![Bucket {
                key: "DP-HQ".into(),
                total: 1,
                registered: 1,
                unregistered: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_capped_registration_is_flagged() {
        let config = EngineConfig {
            rollup_device_limit: 2,
            ..EngineConfig::default()
        };
        let rollup = Rollup::new(mock_backends(), Arc::new(config));
        let summary = rollup.summarize(Some("10.10.10.10")).await;

        let registration = summary.registration.data().unwrap();
        assert!(registration.truncated);
        assert_eq!(registration.total, 2);

        // CSFTEST01 and the trunk fall past the cap and are not reported as unregistered
        let devices = summary.devices.data().unwrap();
        assert!(devices.truncated);
        assert_eq!(devices.unmatched, 2);
        assert!(devices.by_pool.iter().all(|b| b.key != "DP-REMOTE"));
        let unregistered: u64 = devices.by_pool.iter().map(|b| b.unregistered).sum();
        assert_eq!(unregistered, 1);
    }

    #[tokio::test]
    async fn test_summary_with_mock_backends() {
        let rollup = Rollup::new(mock_backends(), Arc::new(EngineConfig::default()));
        let summary = rollup.summarize(Some("10.10.10.10")).await;

        let inventory = summary.inventory.data().unwrap();
        assert_eq!(inventory.version, "14.0(1)");
        assert_eq!(inventory.nodes.len(), 2);

        let pools: Vec<&str> = summary
            .devices
            .data()
            .unwrap()
            .by_pool
            .iter()
            .map(|b| b.key.as_str())
            .collect();
        assert_eq!(pools, vec!["DP-BR1", "DP-HQ", "DP-REMOTE"]);
        assert!(!summary.devices.data().unwrap().truncated);
        assert!(!summary.registration.data().unwrap().truncated);
        assert_eq!(inventory.counts.trunks, 1);
        assert_eq!(summary.performance.data().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_realtime_down_marks_sections_unavailable() {
        let backends = mock_backends().with_realtime(Arc::new(
            MockRealtimeClient::new().fail_all(BackendError::Unreachable("connection refused".into())),
        ));
        let rollup = Rollup::new(backends, Arc::new(EngineConfig::default()));
        let summary = rollup.summarize(Some("10.10.10.10")).await;

        assert!(summary.inventory.is_available());
        assert!(matches!(
            summary.registration,
            Section::Unavailable { error_kind: ProbeErrorKind::Unreachable, .. }
        ));
        assert!(!summary.devices.is_available());
    }

    #[tokio::test]
    async fn test_config_down_marks_performance_unavailable() {
        let backends = mock_backends().with_config(Arc::new(
            MockConfigClient::new().fail_all(BackendError::Fault("Access denied".into())),
        ));
        let rollup = Rollup::new(backends, Arc::new(EngineConfig::default()));
        let summary = rollup.summarize(Some("10.10.10.10")).await;

        assert!(summary.registration.is_available());
        assert!(matches!(
            summary.performance,
            Section::Unavailable { error_kind: ProbeErrorKind::ProtocolFault, .. }
        ));
    }

    #[tokio::test]
    async fn test_no_host() {
        let rollup = Rollup::new(mock_backends(), Arc::new(EngineConfig::default()));
        let summary = rollup.summarize(None).await;
        assert!(matches!(
            summary.inventory,
            Section::Unavailable { error_kind: ProbeErrorKind::NotConfigured, .. }
        ));
        assert!(summary.source_host.is_none());
    }

    #[test]
    fn test_section_wire_shape() {
        let section: Section<u32> = Section::unavailable(ProbeErrorKind::Timeout, "slow");
        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value["state"], "unavailable");
        assert_eq!(value["errorKind"], "timeout");
    }
}
