//! UC Status Microservice
//!
//! Health and status aggregation for a UC cluster:
//! - Per-server TCP and protocol checks with a strict verdict
//! - Cluster rollup of inventory, registration and node counters
//! - Backends wired per deployment as live SOAP, mock or off
//! - Raw pass-through of named backend operations

mod clients;
mod config;
mod error;
mod handlers;
mod routes;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use brivas_core::shutdown_signal;
use brivas_uc_health::mock::{mock_servers, MockConfigClient, MockCounterClient, MockRealtimeClient};
use brivas_uc_health::{Backend, BackendSet, StaticDirectory, StatusEngine};

use clients::{AxlClient, PerfmonClient, RisClient, SoapTransport};
use config::BackendMode;
use stats::RequestStats;

pub use config::Config;
pub use error::{Error, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StatusEngine>,
    pub directory: Arc<StaticDirectory>,
    pub stats: Arc<RequestStats>,
    pub config: Arc<Config>,
}

/// Transport for one live backend; `validate` has already checked credentials
fn live_transport(config: &Config, backend: Backend, timeout: Duration) -> anyhow::Result<SoapTransport> {
    let credentials = config
        .credentials(backend)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no credentials for {} backend", backend))?;
    Ok(SoapTransport::new(credentials, config.verify_ssl, timeout)?)
}

fn build_backends(config: &Config) -> anyhow::Result<BackendSet> {
    let mut backends = BackendSet::new();

    match config.axl_mode {
        BackendMode::Live => {
            let transport = live_transport(config, Backend::Config, config.engine.backend_timeout(Backend::Config))?;
            backends = backends.with_config(Arc::new(AxlClient::new(
                transport,
                &config.axl_version,
                config.engine.rollup_device_limit,
            )));
        }
        BackendMode::Mock => backends = backends.with_config(Arc::new(MockConfigClient::new())),
        BackendMode::Off => {}
    }

    match config.ris_mode {
        BackendMode::Live => {
            let transport =
                live_transport(config, Backend::Realtime, config.engine.backend_timeout(Backend::Realtime))?;
            backends = backends.with_realtime(Arc::new(RisClient::new(transport)));
        }
        BackendMode::Mock => backends = backends.with_realtime(Arc::new(MockRealtimeClient::new())),
        BackendMode::Off => {}
    }

    match config.perfmon_mode {
        BackendMode::Live => {
            let transport =
                live_transport(config, Backend::Counters, config.engine.backend_timeout(Backend::Counters))?;
            backends = backends.with_counters(Arc::new(PerfmonClient::new(transport)));
        }
        BackendMode::Mock => backends = backends.with_counters(Arc::new(MockCounterClient::new())),
        BackendMode::Off => {}
    }

    Ok(backends)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    brivas_telemetry::init("uc-status")?;

    info!("Starting UC Status microservice");

    // Load configuration
    let config = Config::from_env()?;
    let bind_addr = config.service.bind_address()?;

    for backend in [Backend::Config, Backend::Realtime, Backend::Counters] {
        info!(backend = %backend, mode = ?config.mode(backend), "Backend wiring");
    }

    // Load server inventory
    let directory = match &config.inventory_path {
        Some(path) => Arc::new(StaticDirectory::from_file(path).await?),
        None => {
            warn!("UC_INVENTORY_PATH not set, serving the built-in lab inventory");
            Arc::new(StaticDirectory::new(mock_servers()))
        }
    };
    info!(servers = directory.len(), "Server inventory loaded");

    // Build engine
    let backends = build_backends(&config)?;
    let engine = StatusEngine::new(directory.clone(), backends, config.engine.clone());

    // Build application state
    let state = AppState {
        engine: Arc::new(engine),
        directory,
        stats: Arc::new(RequestStats::new()),
        config: Arc::new(config),
    };

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("UC Status listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
