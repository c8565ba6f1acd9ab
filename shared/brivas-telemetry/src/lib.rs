//! Brivas Telemetry
//!
//! Structured logging setup and lightweight in-process metrics.

mod config;
mod tracing_setup;
mod metrics;

pub use config::{LogFormat, TelemetryConfig};
pub use tracing_setup::init_tracing;
pub use metrics::{Counter, Histogram, HistogramSummary};

/// Initialize telemetry for a service from the environment
pub fn init(service_name: &str) -> Result<TelemetryConfig, TelemetryError> {
    let mut config = TelemetryConfig::from_env();
    config.service_name = service_name.to_string();
    init_tracing(&config)?;
    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),
}
