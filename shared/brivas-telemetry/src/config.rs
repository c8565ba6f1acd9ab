//! Telemetry Configuration

use std::str::FromStr;

/// Crates whose debug output drowns the service's own events
const QUIET_TARGETS: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Output encoding of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "brivas-service".to_string(),
            log_level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl TelemetryConfig {
    /// `LOG_FORMAT` wins over the older `JSON_LOGS` flag; an unreadable
    /// format falls back to JSON
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let format = match (env("LOG_FORMAT"), env("JSON_LOGS")) {
            (Some(raw), _) => raw.parse().unwrap_or(LogFormat::Json),
            (None, Some(flag)) if matches!(flag.trim(), "false" | "0") => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Self {
            service_name: env("SERVICE_NAME").unwrap_or_else(|| "brivas-service".to_string()),
            log_level: env("LOG_LEVEL")
                .or_else(|| env("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),
            format,
        }
    }

    /// Filter directive: the configured level plus the quiet dependency targets
    /// unless the level already names targets itself
    pub fn filter_directive(&self) -> String {
        let level = self.log_level.trim();
        if level.contains('=') {
            return level.to_string();
        }
        std::iter::once(level)
            .chain(QUIET_TARGETS.iter().copied())
            .collect::<Vec<_>>()
            .join(",")
    }
}
