//! Configuration for the UC Status microservice

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use brivas_core::config::{env_flag, env_opt, env_parse};
use brivas_core::{BrivasError, ServiceConfig};
use brivas_uc_health::{Backend, EngineConfig};

/// How a backend is wired at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// Canned data from the in-process mock clients
    Mock,
    /// SOAP client against the cluster
    Live,
    /// No client; probes report `notConfigured`
    Off,
}

impl FromStr for BackendMode {
    type Err = BrivasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "live" | "real" => Ok(Self::Live),
            "off" | "none" | "disabled" => Ok(Self::Off),
            other => Err(BrivasError::Config(format!(
                "unknown backend mode '{}' (expected mock, live or off)",
                other
            ))),
        }
    }
}

/// Basic-auth credentials for one backend
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// UC Status configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub engine: EngineConfig,
    pub axl_mode: BackendMode,
    pub ris_mode: BackendMode,
    pub perfmon_mode: BackendMode,
    /// Cluster publisher, also the default rollup host
    pub cucm_host: Option<String>,
    pub axl_credentials: Option<Credentials>,
    pub ris_credentials: Option<Credentials>,
    pub perfmon_credentials: Option<Credentials>,
    /// AXL schema version, e.g. `14.0`
    pub axl_version: String,
    pub verify_ssl: bool,
    /// JSON server inventory; the mock lab inventory when unset
    pub inventory_path: Option<PathBuf>,
}

fn credentials(prefix: &str, shared_user: &Option<String>, shared_pass: &Option<String>) -> Option<Credentials> {
    let username = env_opt(&format!("CUCM_{}_USERNAME", prefix)).or_else(|| shared_user.clone())?;
    let password = env_opt(&format!("CUCM_{}_PASSWORD", prefix)).or_else(|| shared_pass.clone())?;
    Some(Credentials { username, password })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> brivas_core::Result<Self> {
        let mut service = ServiceConfig::from_env()?;
        if service.service_name == "unknown" {
            service.service_name = "uc-status".to_string();
        }

        let defaults = EngineConfig::default();
        let cucm_host = env_opt("CUCM_HOST");
        let engine = EngineConfig {
            tcp_timeout_ms: env_parse("UC_TCP_TIMEOUT_MS", defaults.tcp_timeout_ms)?,
            config_timeout_ms: env_parse("UC_CONFIG_TIMEOUT_MS", defaults.config_timeout_ms)?,
            realtime_timeout_ms: env_parse("UC_REALTIME_TIMEOUT_MS", defaults.realtime_timeout_ms)?,
            counter_timeout_ms: env_parse("UC_COUNTER_TIMEOUT_MS", defaults.counter_timeout_ms)?,
            request_timeout_ms: env_parse("UC_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?,
            max_concurrency: env_parse("UC_MAX_CONCURRENCY", defaults.max_concurrency)?,
            rollup_device_limit: env_parse("UC_ROLLUP_DEVICE_LIMIT", defaults.rollup_device_limit)?,
            rollup_host: env_opt("UC_ROLLUP_HOST").or_else(|| cucm_host.clone()),
        };

        let shared_user = env_opt("CUCM_USERNAME");
        let shared_pass = env_opt("CUCM_PASSWORD");

        let config = Self {
            service,
            engine,
            axl_mode: env_opt("AXL_MODE").map(|v| v.parse()).transpose()?.unwrap_or(BackendMode::Mock),
            ris_mode: env_opt("RIS_MODE").map(|v| v.parse()).transpose()?.unwrap_or(BackendMode::Mock),
            perfmon_mode: env_opt("PERFMON_MODE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(BackendMode::Mock),
            cucm_host,
            axl_credentials: credentials("AXL", &shared_user, &shared_pass),
            ris_credentials: credentials("RIS", &shared_user, &shared_pass),
            perfmon_credentials: credentials("PERFMON", &shared_user, &shared_pass),
            axl_version: env_opt("CUCM_AXL_VERSION").unwrap_or_else(|| "14.0".to_string()),
            verify_ssl: env_flag("CUCM_VERIFY_SSL", false),
            inventory_path: env_opt("UC_INVENTORY_PATH").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn mode(&self, backend: Backend) -> BackendMode {
        match backend {
            Backend::Config => self.axl_mode,
            Backend::Realtime => self.ris_mode,
            Backend::Counters => self.perfmon_mode,
        }
    }

    pub fn credentials(&self, backend: Backend) -> Option<&Credentials> {
        match backend {
            Backend::Config => self.axl_credentials.as_ref(),
            Backend::Realtime => self.ris_credentials.as_ref(),
            Backend::Counters => self.perfmon_credentials.as_ref(),
        }
    }

    /// Live backends need the cluster host and credentials
    pub fn validate(&self) -> brivas_core::Result<()> {
        for backend in [Backend::Config, Backend::Realtime, Backend::Counters] {
            if self.mode(backend) != BackendMode::Live {
                continue;
            }
            if self.cucm_host.is_none() {
                return Err(BrivasError::Config(format!(
                    "{} backend is live but CUCM_HOST is not set",
                    backend
                )));
            }
            if self.credentials(backend).is_none() {
                return Err(BrivasError::Config(format!(
                    "{} backend is live but no CUCM credentials are set",
                    backend
                )));
            }
        }
        if self.engine.max_concurrency == 0 {
            return Err(BrivasError::Config("UC_MAX_CONCURRENCY must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            service: ServiceConfig {
                service_name: "uc-status".into(),
                host: "127.0.0.1".into(),
                http_port: 8099,
                log_level: "info".into(),
            },
            engine: EngineConfig::default(),
            axl_mode: BackendMode::Mock,
            ris_mode: BackendMode::Mock,
            perfmon_mode: BackendMode::Off,
            cucm_host: None,
            axl_credentials: None,
            ris_credentials: None,
            perfmon_credentials: None,
            axl_version: "14.0".into(),
            verify_ssl: false,
            inventory_path: None,
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("LIVE".parse::<BackendMode>().unwrap(), BackendMode::Live);
        assert_eq!("off".parse::<BackendMode>().unwrap(), BackendMode::Off);
        assert!(matches!("zeep".parse::<BackendMode>(), Err(BrivasError::Config(_))));
    }

    #[test]
    fn test_mock_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_live_requires_host_and_credentials() {
        let mut c = config();
        c.axl_mode = BackendMode::Live;
        assert!(c.validate().is_err());

        c.cucm_host = Some("cucm-pub.lab.local".into());
        assert!(c.validate().is_err());

        c.axl_credentials = Some(Credentials {
            username: "axluser".into(),
            password: "secret".into(),
        });
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "axluser".into(),
            password: "secret".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("axluser"));
        assert!(!rendered.contains("secret"));
    }
}
