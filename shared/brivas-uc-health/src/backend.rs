//! Upstream backend client interfaces
//!
//! Each UC protocol surface is reached through one narrow trait. Concrete
//! clients (SOAP adapters, mocks) are chosen at startup and shared as
//! `Arc<dyn ...>`; request-time code never knows which one it holds.
//!
//! Every trait carries a single `invoke` escape hatch for raw named
//! operations instead of one method per remote operation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ProbeErrorKind;

/// Counter sampled by the liveness probe
pub const QUEUE_LENGTH_COUNTER: &str = r"System\Processor Queue Length";

/// Counters sampled per node for the cluster summary
pub const BASIC_NODE_COUNTERS: &[&str] = &[
    r"Cisco CallManager\CallsActive",
    r"Processor(_Total)\% CPU Time",
    r"Memory\% Mem Used",
    r"System\Processor Queue Length",
];

/// Errors raised by backend clients
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("timed out")]
    Timeout,

    #[error("protocol fault: {0}")]
    Fault(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unexpected error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            Self::Unreachable(_) => ProbeErrorKind::Unreachable,
            Self::Timeout => ProbeErrorKind::Timeout,
            Self::Fault(_) => ProbeErrorKind::ProtocolFault,
            Self::NotConfigured(_) => ProbeErrorKind::NotConfigured,
            Self::Malformed(_) | Self::Other(_) => ProbeErrorKind::Unexpected,
        }
    }
}

/// Connection-level I/O errors: timeouts stay timeouts, everything else means
/// the peer could not be reached.
impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => BackendError::Timeout,
            _ => BackendError::Unreachable(err.to_string()),
        }
    }
}

/// The three upstream surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Configuration API (AXL)
    Config,
    /// Real-time registration API (RisPort)
    Realtime,
    /// Counter sampling API (PerfMon)
    Counters,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Realtime => "realtime",
            Self::Counters => "counters",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "config" | "axl" => Ok(Self::Config),
            "realtime" | "ris" | "risport" => Ok(Self::Realtime),
            "counters" | "perfmon" => Ok(Self::Counters),
            other => Err(BackendError::NotConfigured(format!("unknown backend '{}'", other))),
        }
    }
}

/// Device class as used by the registration API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceClass {
    Any,
    Phone,
    Gateway,
    H323,
    Cti,
    VoiceMail,
    MediaResources,
    HuntList,
    #[serde(rename = "SIPTrunk")]
    SipTrunk,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Phone => "Phone",
            Self::Gateway => "Gateway",
            Self::H323 => "H323",
            Self::Cti => "Cti",
            Self::VoiceMail => "VoiceMail",
            Self::MediaResources => "MediaResources",
            Self::HuntList => "HuntList",
            Self::SipTrunk => "SIPTrunk",
            Self::Unknown => "Unknown",
        }
    }

    /// Lenient parse of class names from either upstream API
    pub fn parse_lossy(raw: &str) -> Self {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "any" => Self::Any,
            "phone" => Self::Phone,
            "gateway" => Self::Gateway,
            "h323" | "h323gateway" => Self::H323,
            "cti" | "ctiport" | "ctiroutepoint" => Self::Cti,
            "voicemail" | "voicemailport" => Self::VoiceMail,
            "mediaresources" | "mediaresource" => Self::MediaResources,
            "huntlist" => Self::HuntList,
            "siptrunk" | "trunk" => Self::SipTrunk,
            _ => Self::Unknown,
        }
    }

    /// Trunk-like classes, counted by the trunk summary
    pub fn is_trunk(&self) -> bool {
        matches!(self, Self::Gateway | Self::SipTrunk | Self::H323)
    }
}

/// Live registration state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationStatus {
    Registered,
    Unregistered,
    Rejected,
    PartiallyRegistered,
    Unknown,
}

impl RegistrationStatus {
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "registered" => Self::Registered,
            "unregistered" => Self::Unregistered,
            "rejected" => Self::Rejected,
            "partiallyregistered" => Self::PartiallyRegistered,
            _ => Self::Unknown,
        }
    }
}

/// Configuration-level totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryCounts {
    pub users: u64,
    pub devices: u64,
    /// Rows of the `trunk` table: SIP, H.323 and every other trunk type
    pub trunks: u64,
}

/// Cluster node as reported by the configuration API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessNode {
    pub name: String,
    pub description: Option<String>,
    pub ipv4_address: Option<String>,
    pub role: Option<String>,
}

/// Configured (not necessarily registered) device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredDevice {
    pub name: String,
    pub device_class: DeviceClass,
    pub device_pool: Option<String>,
    pub model: Option<String>,
}

/// Normalized answer of the configuration API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPayload {
    pub version: String,
    pub counts: InventoryCounts,
    pub nodes: Vec<ProcessNode>,
    pub devices: Vec<ConfiguredDevice>,
}

/// Registration-state query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceQuery {
    /// SQL-style name pattern, `%` matches any run of characters
    pub pattern: String,
    pub class: DeviceClass,
    pub limit: u32,
}

impl DeviceQuery {
    /// At most one phone: used purely to prove the API answers
    pub fn liveness() -> Self {
        Self {
            pattern: "%".to_string(),
            class: DeviceClass::Phone,
            limit: 1,
        }
    }

    pub fn all(limit: u32) -> Self {
        Self {
            pattern: "%".to_string(),
            class: DeviceClass::Any,
            limit,
        }
    }
}

/// Live registration state of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub name: String,
    pub device_class: DeviceClass,
    pub status: RegistrationStatus,
    pub node: Option<String>,
    pub ip_address: Option<String>,
    pub model: Option<String>,
    pub protocol: Option<String>,
}

/// Configuration API (static topology)
#[async_trait]
pub trait ConfigClient: Send + Sync {
    /// Cluster version; the cheapest read the API offers
    async fn version(&self, host: &str) -> Result<String, BackendError>;

    /// Version, totals, process nodes and configured device inventory
    async fn config_summary(&self, host: &str) -> Result<ConfigPayload, BackendError>;

    /// Raw named operation
    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError>;
}

/// Real-time registration API
#[async_trait]
pub trait RealtimeClient: Send + Sync {
    async fn registered_devices(
        &self,
        host: &str,
        query: &DeviceQuery,
    ) -> Result<Vec<DeviceState>, BackendError>;

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError>;
}

/// Counter sampling API
#[async_trait]
pub trait CounterClient: Send + Sync {
    /// Values keyed by the requested counter name
    async fn sample_counters(
        &self,
        host: &str,
        node: &str,
        counters: &[String],
    ) -> Result<BTreeMap<String, f64>, BackendError>;

    async fn invoke(&self, host: &str, operation: &str, params: Value) -> Result<Value, BackendError>;
}

/// The clients wired for this deployment; `None` means not configured
#[derive(Clone, Default)]
pub struct BackendSet {
    pub config: Option<Arc<dyn ConfigClient>>,
    pub realtime: Option<Arc<dyn RealtimeClient>>,
    pub counters: Option<Arc<dyn CounterClient>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, client: Arc<dyn ConfigClient>) -> Self {
        self.config = Some(client);
        self
    }

    pub fn with_realtime(mut self, client: Arc<dyn RealtimeClient>) -> Self {
        self.realtime = Some(client);
        self
    }

    pub fn with_counters(mut self, client: Arc<dyn CounterClient>) -> Self {
        self.counters = Some(client);
        self
    }

    pub fn is_configured(&self, backend: Backend) -> bool {
        match backend {
            Backend::Config => self.config.is_some(),
            Backend::Realtime => self.realtime.is_some(),
            Backend::Counters => self.counters.is_some(),
        }
    }

    /// Route a raw operation to the matching client
    pub async fn invoke(
        &self,
        backend: Backend,
        host: &str,
        operation: &str,
        params: Value,
    ) -> Result<Value, BackendError> {
        let not_configured = || BackendError::NotConfigured(format!("no {} client wired", backend));
        match backend {
            Backend::Config => {
                let client = self.config.as_ref().ok_or_else(not_configured)?;
                client.invoke(host, operation, params).await
            }
            Backend::Realtime => {
                let client = self.realtime.as_ref().ok_or_else(not_configured)?;
                client.invoke(host, operation, params).await
            }
            Backend::Counters => {
                let client = self.counters.as_ref().ok_or_else(not_configured)?;
                client.invoke(host, operation, params).await
            }
        }
    }
}

impl fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSet")
            .field("config", &self.config.is_some())
            .field("realtime", &self.realtime.is_some())
            .field("counters", &self.counters.is_some())
            .finish()
    }
}
