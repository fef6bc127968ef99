// # HTTP IP Source
//
// Discovers the host's public address by asking an echo service. The
// response body is the address as plain text.
//
// - IPv4: `https://checkip.amazonaws.com/`
// - IPv6: `https://ifconfig.co/ip`, which answers over whichever family the
//   connection used, so the result's family is checked
//
// Every call is a fresh request with a 10 second timeout. No caching, no
// polling, no background tasks.

use tasks_core::traits::{IpSource, IpVersion};
use tasks_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Echo service returning the caller's IPv4 address
pub const DEFAULT_IPV4_URL: &str = "https://checkip.amazonaws.com/";

/// Echo service returning the caller's address as text
pub const DEFAULT_IPV6_URL: &str = "https://ifconfig.co/ip";

/// Timeout for a single lookup
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP echo-service IP source
#[derive(Debug, Clone)]
pub struct HttpIpSource {
    ipv4_url: String,
    ipv6_url: String,
    client: reqwest::Client,
}

impl HttpIpSource {
    /// Create a source using the default echo services
    pub fn new() -> Result<Self> {
        Self::with_endpoints(DEFAULT_IPV4_URL, DEFAULT_IPV6_URL)
    }

    /// Create a source using custom echo endpoints
    pub fn with_endpoints(
        ipv4_url: impl Into<String>,
        ipv6_url: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            ipv4_url: ipv4_url.into(),
            ipv6_url: ipv6_url.into(),
            client,
        })
    }

    fn url_for(&self, version: IpVersion) -> &str {
        match version {
            IpVersion::V4 => &self.ipv4_url,
            IpVersion::V6 => &self.ipv6_url,
        }
    }

    async fn fetch_ip(&self, version: IpVersion) -> Result<IpAddr> {
        let url = self.url_for(version);
        tracing::debug!("Fetching public {} from {}", version, url);

        let response = self
            .client
            .get(url)
            .header("Accept", "text/plain")
            .send()
            .await
            .map_err(|e| Error::ip_source(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::ip_source(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ip_source(format!("failed to read response: {}", e)))?;

        parse_address(&body, version)
    }
}

/// Parse an echo response body, requiring the expected family
pub fn parse_address(body: &str, version: IpVersion) -> Result<IpAddr> {
    let text = body.trim();

    let ip: IpAddr = text
        .parse()
        .map_err(|_| Error::ip_source(format!("invalid IP address: {:?}", text)))?;

    if !version.matches(&ip) {
        return Err(Error::ip_source(format!("expected {}, got {}", version, ip)));
    }

    Ok(ip)
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn current(&self, version: IpVersion) -> Result<IpAddr> {
        self.fetch_ip(version).await
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
