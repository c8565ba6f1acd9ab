//! Configuration management for microservices

use crate::error::{BrivasError, Result};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub host: String,
    pub http_port: u16,
    pub log_level: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "unknown".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| BrivasError::Config(format!("Invalid HTTP_PORT: {}", e)))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Socket address the HTTP listener binds to
    pub fn bind_address(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.http_port)
            .parse()
            .map_err(|e| BrivasError::Config(format!("Invalid bind address: {}", e)))
    }
}

/// Read an optional variable, treating empty values as unset
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable, falling back to `default` when unset
pub fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BrivasError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

/// Read a boolean flag ("true"/"1" are truthy)
pub fn env_flag(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let config = ServiceConfig {
            service_name: "uc-status".into(),
            host: "127.0.0.1".into(),
            http_port: 8099,
            log_level: "info".into(),
        };
        assert_eq!(config.bind_address().unwrap().port(), 8099);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("BRIVAS_CORE_TEST_PORT", "not-a-port");
        let parsed: Result<u16> = env_parse("BRIVAS_CORE_TEST_PORT", 80);
        assert!(matches!(parsed, Err(BrivasError::Config(_))));
        std::env::remove_var("BRIVAS_CORE_TEST_PORT");

        let fallback: u16 = env_parse("BRIVAS_CORE_TEST_PORT", 80).unwrap();
        assert_eq!(fallback, 80);
    }
}
