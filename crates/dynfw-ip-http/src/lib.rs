// # HTTP IP Source
//
// This crate provides an HTTP/JSON-based IP source for dynfw.
//
// ## Protocol
//
// One GET per `resolve()` to an IP-echo service that answers with JSON:
//
// ```http
// GET /?format=json
// Accept: application/json
//
// {"ip": "203.0.113.7"}
// ```
//
// ipify is the default; any service with the same response shape works.
// The source keeps no cache and has no polling loop of its own; the engine
// decides when to call it.

use dynfw_core::config::IpSourceConfig;
use dynfw_core::traits::IpSource;
use dynfw_core::{Error, Result};

use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

/// Response body of the IP-echo service
#[derive(Debug, Deserialize)]
struct EchoResponse {
    ip: String,
}

/// HTTP-based IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    /// URL to fetch IP from
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a new HTTP IP source
    ///
    /// # Parameters
    ///
    /// - `url`: URL to fetch IP from (e.g., "https://api.ipify.org?format=json")
    /// - `timeout`: Per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Create from configuration
    pub fn from_config(config: &IpSourceConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// URL this source queries
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch current IP from the echo service
    async fn fetch_ip(&self) -> Result<IpAddr> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::provider_unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::provider_unavailable(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::provider_unavailable(format!("Failed to read response: {}", e)))?;

        parse_echo_body(&body)
    }
}

/// Extract the address from an echo response body
fn parse_echo_body(body: &str) -> Result<IpAddr> {
    let echo: EchoResponse = serde_json::from_str(body)
        .map_err(|e| Error::malformed_response(format!("Invalid JSON body: {}", e)))?;

    let ip_text = echo.ip.trim();
    if ip_text.is_empty() {
        return Err(Error::malformed_response("Empty 'ip' field"));
    }

    ip_text
        .parse()
        .map_err(|_| Error::malformed_response(format!("Invalid IP address: {}", ip_text)))
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn resolve(&self) -> Result<IpAddr> {
        let ip = self.fetch_ip().await?;
        tracing::debug!(url = %self.url, ip = %ip, "Resolved public IP");
        Ok(ip)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
