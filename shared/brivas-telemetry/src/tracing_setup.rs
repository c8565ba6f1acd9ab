//! Tracing Setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::LogFormat;
use crate::{TelemetryConfig, TelemetryError};

fn fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().with_target(false).boxed(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(raw) if !raw.trim().is_empty() => EnvFilter::try_new(raw),
        _ => EnvFilter::try_new(config.filter_directive()),
    }
    .map_err(|e| TelemetryError::Filter(e.to_string()))?;

    tracing_subscriber::registry()
        .with(fmt_layer(config.format))
        .with(env_filter)
        .try_init()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        filter = %config.filter_directive(),
        format = ?config.format,
        "Tracing initialized"
    );

    Ok(())
}
