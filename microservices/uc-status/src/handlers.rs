//! HTTP handlers for the UC Status API

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use brivas_core::{ServerId, TenantId};
use brivas_uc_health::{
    Backend, BackendStatus, ClusterHealthReport, ClusterSummary, HealthSnapshot, ProbeResult, ServerHealth,
    ServerRecord, TenantScope,
};

use crate::stats::StatsResponse;
use crate::{AppState, Error, Result};

/// Liveness response
#[derive(Serialize)]
pub struct LiveResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub config: ProbeResult,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub tenant: Option<String>,
}

impl ScopeQuery {
    fn scope(&self) -> Result<TenantScope> {
        match self.tenant.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            None => Ok(TenantScope::All),
            Some(raw) => raw
                .parse::<TenantId>()
                .map(TenantScope::Tenant)
                .map_err(|e| Error::InvalidRequest(e.to_string())),
        }
    }
}

/// Inventory entry with its last recorded health
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    #[serde(flatten)]
    pub server: ServerRecord,
    pub last_health: Option<HealthSnapshot>,
}

// ============================================
// Service Health
// ============================================

pub async fn live(State(state): State<AppState>) -> Json<LiveResponse> {
    Json(LiveResponse {
        status: "alive",
        service: state.config.service.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 200 only when the configuration backend answers
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let config = state.engine.readiness().await;
    let status = if config.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready: config.ok,
            config,
        }),
    )
}

pub async fn health(State(state): State<AppState>) -> Json<BackendStatus> {
    state.stats.record_request();
    Json(state.engine.backend_status().await)
}

// ============================================
// Server Health
// ============================================

pub async fn cluster_health(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<ClusterHealthReport>> {
    state.stats.record_request();
    let scope = query.scope()?;

    let report = state.engine.cluster_health(&scope).await?;
    for server in &report.servers {
        state.stats.record_checks(server);
        write_back(&state, server).await;
    }

    info!(
        total = report.total,
        healthy = report.healthy,
        unhealthy = report.unhealthy,
        "Cluster health served"
    );
    Ok(Json(report))
}

pub async fn server_health(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ServerHealth>> {
    state.stats.record_request();
    let id: ServerId = id.parse().map_err(|e: brivas_core::BrivasError| Error::InvalidRequest(e.to_string()))?;

    let health = state.engine.server_health(id).await?;
    state.stats.record_checks(&health);
    write_back(&state, &health).await;

    Ok(Json(health))
}

/// Snapshot write-back is advisory; a failure never fails the request
async fn write_back(state: &AppState, health: &ServerHealth) {
    if let Err(e) = state.engine.directory().record_health(health.snapshot()).await {
        warn!(server_id = %health.server.id, error = %e, "Failed to record health snapshot");
    }
}

pub async fn list_servers(State(state): State<AppState>) -> Json<Vec<ServerEntry>> {
    let entries = state
        .directory
        .entries()
        .into_iter()
        .map(|(server, last_health)| ServerEntry { server, last_health })
        .collect();
    Json(entries)
}

// ============================================
// Cluster Rollup
// ============================================

pub async fn cluster_summary(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<ClusterSummary>> {
    state.stats.record_request();
    let scope = query.scope()?;
    Ok(Json(state.engine.cluster_summary(&scope).await?))
}

// ============================================
// Raw Backend Operations
// ============================================

fn valid_operation(name: &str) -> bool {
    !name.is_empty() && name.len() <= 128 && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Forward a named operation with a JSON parameter object
pub async fn raw(
    State(state): State<AppState>,
    Path((backend, operation)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>> {
    state.stats.record_request();

    let backend: Backend = backend
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("unknown backend '{}'", backend)))?;
    if !valid_operation(&operation) {
        return Err(Error::InvalidRequest(format!("invalid operation name '{}'", operation)));
    }

    let params = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice::<Value>(&body)
            .map_err(|e| Error::InvalidRequest(format!("body is not JSON: {}", e)))?
    };
    if !params.is_object() {
        return Err(Error::InvalidRequest("parameters must be a JSON object".to_string()));
    }

    let result = state.engine.invoke_raw(backend, &operation, params).await?;
    Ok(Json(json!({
        "backend": backend.as_str(),
        "operation": operation,
        "result": result,
    })))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.stats.snapshot())
}
