//! Live SOAP clients for the CUCM APIs
//!
//! One shared HTTPS transport with basic auth; each adapter knows its
//! endpoint path, namespace and how to normalize its answers.

pub mod axl;
pub mod perfmon;
pub mod ris;
pub mod xml;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use brivas_uc_health::BackendError;

use crate::config::Credentials;

pub use axl::AxlClient;
pub use perfmon::PerfmonClient;
pub use ris::RisClient;

/// Port every CUCM SOAP service listens on
pub const CUCM_HTTPS_PORT: u16 = 8443;

/// Authenticated SOAP-over-HTTPS transport
#[derive(Clone)]
pub struct SoapTransport {
    client: Client,
    credentials: Credentials,
}

impl SoapTransport {
    pub fn new(credentials: Credentials, verify_ssl: bool, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| BackendError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, credentials })
    }

    /// POST an envelope and return the SOAP body as JSON
    pub async fn call(&self, url: &str, soap_action: &str, envelope: String) -> Result<Value, BackendError> {
        debug!(url = %url, action = %soap_action, "SOAP request");

        let response = self
            .client
            .post(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", soap_action)
            .body(envelope)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        // CUCM answers faults with HTTP 500 and a SOAP Fault body
        if text.trim_start().starts_with('<') {
            match xml::to_json(&text).and_then(xml::soap_body) {
                Ok(body) if status.is_success() => return Ok(body),
                Err(fault @ BackendError::Fault(_)) => return Err(fault),
                Err(err) if status.is_success() => return Err(err),
                _ => {}
            }
        }

        match status.as_u16() {
            401 | 403 => Err(BackendError::Fault(format!("HTTP {}: credentials rejected", status))),
            _ if status.is_success() => Err(BackendError::Malformed("response is not XML".to_string())),
            _ => Err(BackendError::Fault(format!("HTTP {}", status))),
        }
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else if err.is_connect() {
        BackendError::Unreachable(err.to_string())
    } else {
        BackendError::Other(err.to_string())
    }
}

/// `https://{host}:8443{path}`
pub fn endpoint(host: &str, path: &str) -> String {
    format!("https://{}:{}{}", host, CUCM_HTTPS_PORT, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        assert_eq!(endpoint("10.10.10.10", "/axl/"), "https://10.10.10.10:8443/axl/");
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = SoapTransport::new(
            Credentials {
                username: "u".into(),
                password: "p".into(),
            },
            false,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = transport
            .call(&format!("https://127.0.0.1:{}/axl/", port), "x", String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreachable(_)));
    }
}
