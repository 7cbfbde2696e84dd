//! HTTP gateway client.
//!
//! Talks to the router's local REST endpoint over basic auth. The wire
//! protocol is deliberately small: one GET returning the connected host
//! list as JSON.

use super::{GatewayClient, GatewayError, Host};
use serde::Deserialize;
use std::time::Duration;

/// Default per-request timeout. Exceeding it is a communication failure.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Username the gateway expects for its admin API.
const GATEWAY_USERNAME: &str = "admin";

#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    base_url: String,
    password: String,
    client: reqwest::Client,
}

impl HttpGatewayClient {
    pub fn new(gateway_host: &str, password: &str) -> Result<Self, GatewayError> {
        Self::with_timeout(gateway_host, password, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        gateway_host: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unclassified(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: format!("http://{}/api/v1", gateway_host.trim().trim_end_matches('/')),
            password: password.to_string(),
            client,
        })
    }
}

impl GatewayClient for HttpGatewayClient {
    async fn fetch_hosts(&self) -> Result<Vec<Host>, GatewayError> {
        let url = format!("{}/hosts", self.base_url);

        let resp = self
            .client
            .get(&url)
            .basic_auth(GATEWAY_USERNAME, Some(&self.password))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Communication(format!("request to {url} timed out"))
                } else {
                    GatewayError::Communication(e.to_string())
                }
            })?;

        match resp.status().as_u16() {
            200 => {
                let body: HostListResponse = resp.json().await.map_err(|e| {
                    GatewayError::Unclassified(format!("failed to parse host list: {e}"))
                })?;
                Ok(body.hosts)
            }
            401 | 403 => Err(GatewayError::Authentication(format!(
                "gateway returned {}",
                resp.status()
            ))),
            status => Err(GatewayError::Communication(format!(
                "gateway returned unexpected status {status}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostListResponse {
    hosts: Vec<Host>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let client = HttpGatewayClient::new("192.168.1.1/", "secret").unwrap();
        assert_eq!(client.base_url, "http://192.168.1.1/api/v1");
    }

    #[test]
    fn test_host_list_wire_format() {
        let json = r#"{
            "hosts": [
                {
                    "macAddress": "AA:BB:CC:DD:EE:FF",
                    "name": "Laptop",
                    "hostname": "laptop.lan",
                    "ipAddress": "192.168.1.42",
                    "active": true
                }
            ]
        }"#;
        let parsed: HostListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.hosts.len(), 1);
        assert_eq!(parsed.hosts[0].mac_address, "AA:BB:CC:DD:EE:FF");
        assert!(parsed.hosts[0].active);
    }
}
