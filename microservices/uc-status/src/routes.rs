//! Router configuration for the UC Status API

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::AppState;

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Service Health
        .route("/health/live", get(handlers::live))
        .route("/health/ready", get(handlers::ready))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        // Server Health
        .route("/health/servers", get(handlers::cluster_health))
        .route("/health/servers/{id}", get(handlers::server_health))
        .route("/servers", get(handlers::list_servers))
        // Cluster Rollup
        .route("/status/cluster", get(handlers::cluster_summary))
        // Raw Backend Operations
        .route("/raw/{backend}/{operation}", post(handlers::raw))
        .with_state(state)
}
