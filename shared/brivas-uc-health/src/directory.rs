//! Server directory collaborator
//!
//! The engine reads server records through [`ServerDirectory`] and never
//! mutates them. The only write is the advisory health snapshot, which the
//! caller hands back through [`ServerDirectory::record_health`].

use std::path::Path;

use async_trait::async_trait;
use brivas_core::{ServerId, TenantId};
use dashmap::DashMap;

use crate::types::{HealthError, HealthSnapshot, ServerRecord};

/// Which tenants a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantScope {
    #[default]
    All,
    Tenant(TenantId),
}

impl TenantScope {
    pub fn includes(&self, tenant: TenantId) -> bool {
        match self {
            Self::All => true,
            Self::Tenant(id) => *id == tenant,
        }
    }
}

#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Called once per cluster health or summary request. The engine keeps
    /// the all-tenant cluster host after the first successful lookup.
    async fn list_enabled_servers(&self, scope: &TenantScope) -> Result<Vec<ServerRecord>, HealthError>;

    async fn get_server(&self, id: ServerId) -> Result<Option<ServerRecord>, HealthError>;

    async fn record_health(&self, _snapshot: HealthSnapshot) -> Result<(), HealthError> {
        Ok(())
    }
}

/// In-memory directory loaded once at startup
#[derive(Debug, Default)]
pub struct StaticDirectory {
    servers: Vec<ServerRecord>,
    last_health: DashMap<ServerId, HealthSnapshot>,
}

impl StaticDirectory {
    pub fn new(servers: Vec<ServerRecord>) -> Self {
        Self {
            servers,
            last_health: DashMap::new(),
        }
    }

    /// Parse a JSON array of server records
    pub fn from_json(raw: &str) -> Result<Self, HealthError> {
        let servers: Vec<ServerRecord> =
            serde_json::from_str(raw).map_err(|e| HealthError::Directory(e.to_string()))?;
        Ok(Self::new(servers))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HealthError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HealthError::Directory(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// All records, enabled or not, with their last recorded snapshot
    pub fn entries(&self) -> Vec<(ServerRecord, Option<HealthSnapshot>)> {
        self.servers
            .iter()
            .map(|record| (record.clone(), self.last_health(record.id)))
            .collect()
    }

    pub fn last_health(&self, id: ServerId) -> Option<HealthSnapshot> {
        self.last_health.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[async_trait]
impl ServerDirectory for StaticDirectory {
    async fn list_enabled_servers(&self, scope: &TenantScope) -> Result<Vec<ServerRecord>, HealthError> {
        Ok(self
            .servers
            .iter()
            .filter(|s| s.enabled && scope.includes(s.tenant_id))
            .cloned()
            .collect())
    }

    async fn get_server(&self, id: ServerId) -> Result<Option<ServerRecord>, HealthError> {
        Ok(self.servers.iter().find(|s| s.id == id).cloned())
    }

    async fn record_health(&self, snapshot: HealthSnapshot) -> Result<(), HealthError> {
        if self.servers.iter().any(|s| s.id == snapshot.server_id) {
            self.last_health.insert(snapshot.server_id, snapshot);
            Ok(())
        } else {
            Err(HealthError::NotFound(snapshot.server_id))
        }
    }
}
