//! Health model types

use brivas_core::{ServerId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Check key used when a server record cannot be probed at all
pub const RECORD_CHECK: &str = "record";

/// UC product family of a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    Cucm,
    Unity,
    Expressway,
    Uccx,
    Imp,
    Cube,
    Cer,
    Cms,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cucm => "cucm",
            Self::Unity => "unity",
            Self::Expressway => "expressway",
            Self::Uccx => "uccx",
            Self::Imp => "imp",
            Self::Cube => "cube",
            Self::Cer => "cer",
            Self::Cms => "cms",
        }
    }

    /// Ports probed when the record carries no explicit list
    pub fn default_ports(&self) -> &'static [u16] {
        match self {
            Self::Cucm | Self::Expressway | Self::Uccx | Self::Imp | Self::Cer => &[8443, 443],
            Self::Unity => &[7071, 443],
            Self::Cube => &[5060, 5061],
            Self::Cms => &[443],
        }
    }

    /// Whether the configuration, registration and counter APIs apply.
    ///
    /// Only CUCM nodes are probed over those protocols; other product
    /// families get port checks until they grow their own probes.
    pub fn has_protocol_checks(&self) -> bool {
        matches!(self, Self::Cucm)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerType {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cucm" => Ok(Self::Cucm),
            "unity" => Ok(Self::Unity),
            "expressway" => Ok(Self::Expressway),
            "uccx" => Ok(Self::Uccx),
            "imp" => Ok(Self::Imp),
            "cube" => Ok(Self::Cube),
            "cer" => Ok(Self::Cer),
            "cms" => Ok(Self::Cms),
            other => Err(HealthError::InvalidServer(format!("unknown server type '{}'", other))),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// A managed server as owned by the inventory store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: ServerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub fqdn: String,
    #[serde(default)]
    pub mgmt_address: Option<String>,
    pub server_type: ServerType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub ports: Option<Vec<u16>>,
    #[serde(default)]
    pub cluster_name: Option<String>,
}

impl ServerRecord {
    /// Management address if set, otherwise the FQDN
    pub fn target_host(&self) -> Option<&str> {
        self.mgmt_address
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .or_else(|| Some(self.fqdn.trim()).filter(|h| !h.is_empty()))
    }

    /// Explicit port list (deduplicated, order kept) or the type defaults
    pub fn ports_to_check(&self) -> Vec<u16> {
        match &self.ports {
            Some(explicit) => {
                let mut seen = BTreeSet::new();
                explicit.iter().copied().filter(|p| seen.insert(*p)).collect()
            }
            None => self.server_type.default_ports().to_vec(),
        }
    }
}

/// Failure taxonomy of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeErrorKind {
    #[default]
    None,
    Unreachable,
    Timeout,
    ProtocolFault,
    NotConfigured,
    Unexpected,
}

/// Outcome of one bounded call to one backend (or one TCP port)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub error_kind: ProbeErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ProbeResult {
    pub fn success(latency: Duration, payload: Map<String, Value>) -> Self {
        Self {
            ok: true,
            latency_ms: millis(latency),
            payload,
            error_kind: ProbeErrorKind::None,
            error_message: None,
        }
    }

    pub fn failure(kind: ProbeErrorKind, message: impl Into<String>, latency: Duration) -> Self {
        Self {
            ok: false,
            latency_ms: millis(latency),
            payload: Map::new(),
            error_kind: kind,
            error_message: Some(message.into()),
        }
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// One entry in a server's check map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckKind {
    Tcp(u16),
    Config,
    Realtime,
    Counters,
}

impl CheckKind {
    /// Stable key in the check map; TCP checks are keyed by the bare port number
    pub fn key(&self) -> String {
        match self {
            Self::Tcp(port) => port.to_string(),
            Self::Config => "config".to_string(),
            Self::Realtime => "realtime".to_string(),
            Self::Counters => "counters".to_string(),
        }
    }

    /// Coarse label used for metrics
    pub fn family(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Config => "config",
            Self::Realtime => "realtime",
            Self::Counters => "counters",
        }
    }

    /// Inverse of [`CheckKind::key`]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "config" => Some(Self::Config),
            "realtime" => Some(Self::Realtime),
            "counters" => Some(Self::Counters),
            other => other.parse().ok().map(Self::Tcp),
        }
    }
}

/// Identity fields copied out of a [`ServerRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdentity {
    pub id: ServerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub fqdn: String,
    pub server_type: ServerType,
    pub cluster_name: Option<String>,
    pub target_host: Option<String>,
}

impl From<&ServerRecord> for ServerIdentity {
    fn from(record: &ServerRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: record.tenant_id,
            name: record.name.clone(),
            fqdn: record.fqdn.clone(),
            server_type: record.server_type,
            cluster_name: record.cluster_name.clone(),
            target_host: record.target_host().map(str::to_string),
        }
    }
}

/// Degradation class of a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every applicable check passed
    Up,
    /// Some, not all, applicable checks failed
    Degraded,
    /// Every applicable check failed
    Down,
    /// Nothing applicable could be checked
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Degraded => "degraded",
            Self::Down => "down",
            Self::Unknown => "unknown",
        }
    }
}

/// Health of one server at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerHealth {
    #[serde(flatten)]
    pub server: ServerIdentity,
    pub checks: BTreeMap<String, ProbeResult>,
    pub applicable: BTreeSet<String>,
    pub overall_ok: bool,
    pub status: HealthStatus,
    pub failing: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl ServerHealth {
    /// Advisory `lastHealthCheck*` values for the inventory store
    pub fn snapshot(&self) -> HealthSnapshot {
        let message = match self.status {
            HealthStatus::Up => format!("{} checks passed", self.applicable.len()),
            HealthStatus::Unknown => "no applicable checks".to_string(),
            HealthStatus::Degraded | HealthStatus::Down => {
                let details: Vec<String> = self
                    .failing
                    .iter()
                    .map(|key| {
                        let reason = self
                            .checks
                            .get(key)
                            .and_then(|r| r.error_message.as_deref())
                            .unwrap_or("failed");
                        format!("{}: {}", key, reason)
                    })
                    .collect();
                details.join("; ")
            }
        };

        HealthSnapshot {
            server_id: self.server.id,
            checked_at: self.checked_at,
            status: self.status,
            message: truncate(message, 500),
        }
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

/// Last-health triple handed back to the inventory store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub server_id: ServerId,
    #[serde(rename = "lastHealthCheckAt")]
    pub checked_at: DateTime<Utc>,
    #[serde(rename = "lastHealthStatus")]
    pub status: HealthStatus,
    #[serde(rename = "lastHealthMessage")]
    pub message: String,
}

/// Result of one cluster-wide health request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterHealthReport {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub servers: Vec<ServerHealth>,
    pub checked_at: DateTime<Utc>,
}

impl ClusterHealthReport {
    pub fn from_servers(servers: Vec<ServerHealth>) -> Self {
        let healthy = servers.iter().filter(|s| s.overall_ok).count();
        Self {
            total: servers.len(),
            healthy,
            unhealthy: servers.len() - healthy,
            servers,
            checked_at: Utc::now(),
        }
    }
}

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Invalid server record: {0}")]
    InvalidServer(String),

    #[error("Server not found: {0}")]
    NotFound(ServerId),

    #[error("Inventory lookup failed: {0}")]
    Directory(String),

    #[error("Request exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}
