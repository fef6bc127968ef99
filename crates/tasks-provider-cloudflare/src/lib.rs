// # Cloudflare DNS Provider
//
// Cloudflare API v4 implementation of `DnsProvider`.
//
// - One GET to look up the record, one PUT to replace it
// - Bearer token authentication; the token never appears in logs or Debug
// - 15 second timeout on every request
// - HTTP status codes and the envelope's `success` flag are both checked
// - No retries, caching or propagation tracking (Cloudflare applies
//   changes synchronously)
//
// ## Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS API calls to the Cloudflare API only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Retry or back off (the next scheduler tick is the retry)
// - ❌ Create records that do not exist
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::time::Duration;
use tasks_core::config::ProviderConfig;
use tasks_core::traits::{
    DnsProvider, DnsProviderFactory, RecordMetadata, RecordType, UpsertReceipt,
};
use tasks_core::{Error, ProviderRegistry, Result};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Response envelope shared by every Cloudflare v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

/// A DNS record as returned by the API
#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    name: String,
    content: String,
    ttl: Option<u32>,
    #[serde(default)]
    proxied: bool,
}

fn describe_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{} ({})", e.message, e.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map a non-success HTTP status to an error
fn status_error(status: reqwest::StatusCode, body: &str, context: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "Cloudflare rejected the API token \
            (invalid or missing DNS edit permission). Status: {}",
            status
        )),
        404 => Error::not_found(format!("{}: {}", context, status)),
        429 => Error::rate_limited(format!(
            "Cloudflare rate limit exceeded. Status: {}",
            status
        )),
        500..=599 => Error::provider(
            "cloudflare",
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider("cloudflare", format!("{}: {} - {}", context, status, body)),
    }
}

/// Cloudflare DNS provider
///
/// Bound to one zone. The `proxied` flag is applied on every write.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    zone_id: String,

    /// Whether written records are proxied through Cloudflare
    proxied: bool,

    client: reqwest::Client,

    /// API base URL, overridable for tests
    base_url: String,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("proxied", &self.proxied)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider for one zone
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the token or zone ID is empty
    /// - `Error::Http` if the HTTP client cannot be built
    pub fn new(
        api_token: impl Into<String>,
        zone_id: impl Into<String>,
        proxied: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        let zone_id = zone_id.into();

        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }
        if zone_id.is_empty() {
            return Err(Error::config("Cloudflare zone ID cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            proxied,
            client,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        })
    }

    /// Point the provider at another API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    /// Send a request and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &body, context));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider("cloudflare", format!("{}: invalid response: {}", context, e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                "cloudflare",
                format!("{}: {}", context, describe_errors(&envelope.errors)),
            ));
        }

        envelope.result.ok_or_else(|| {
            Error::provider("cloudflare", format!("{}: response has no result", context))
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Look up the record by name and type
    ///
    /// Exactly one match is required; no match or several matches are
    /// errors, so a lookup never resolves to `Ok(None)`.
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    /// Authorization: Bearer <token>
    /// ```
    async fn get_record(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordMetadata>> {
        tracing::debug!(
            "Looking up Cloudflare record: {} (type: {})",
            record_name,
            record_type
        );

        let request = self
            .client
            .get(self.records_url())
            .query(&[("name", record_name), ("type", record_type.as_str())]);

        let context = format!("DNS record lookup failed for {}", record_name);
        let mut records: Vec<DnsRecord> = self.call(request, &context).await?;

        let record = match records.len() {
            0 => {
                return Err(Error::not_found(format!(
                    "DNS record not found: {} (type: {})",
                    record_name, record_type
                )));
            }
            1 => records.remove(0),
            n => {
                return Err(Error::provider(
                    "cloudflare",
                    format!(
                        "{} {} records match {}; refusing to pick one",
                        n, record_type, record_name
                    ),
                ));
            }
        };

        tracing::debug!("Found record ID: {}", record.id);
        Ok(Some(RecordMetadata {
            id: Some(record.id),
            name: record.name,
            record_type,
            value: record.content,
            ttl: record.ttl,
            extra: serde_json::json!({ "proxied": record.proxied }),
        }))
    }

    /// Replace the record's content
    ///
    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// {"type": "A", "name": "...", "content": "1.2.3.5", "ttl": 300, "proxied": false}
    /// ```
    async fn upsert_record(
        &self,
        record_name: &str,
        record_type: RecordType,
        new_ip: IpAddr,
        ttl: u32,
        existing: Option<&RecordMetadata>,
    ) -> Result<UpsertReceipt> {
        let record_id = existing.and_then(|r| r.id.as_deref()).ok_or_else(|| {
            Error::invalid_input(format!(
                "Cloudflare updates need an existing record ID for {}",
                record_name
            ))
        })?;

        let payload = serde_json::json!({
            "type": record_type.as_str(),
            "name": record_name,
            "content": new_ip.to_string(),
            "ttl": ttl,
            "proxied": self.proxied,
        });

        let request = self
            .client
            .put(format!("{}/{}", self.records_url(), record_id))
            .json(&payload);

        let context = format!("Cloudflare update error for {}", record_name);
        let _: serde_json::Value = self.call(request, &context).await?;

        tracing::info!(
            "Cloudflare record updated: {} -> {} (proxied={})",
            record_name,
            new_ip,
            self.proxied
        );
        Ok(UpsertReceipt::default())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

#[async_trait]
impl DnsProviderFactory for CloudflareFactory {
    async fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                proxied,
                ..
            } => {
                let missing = config.missing_fields();
                if !missing.is_empty() {
                    return Err(Error::config(format!(
                        "Cloudflare provider needs {}",
                        missing.join(", ")
                    )));
                }

                let provider = CloudflareProvider::new(
                    api_token.clone().unwrap_or_default(),
                    zone_id.clone().unwrap_or_default(),
                    *proxied,
                )?;
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// ```rust
/// use tasks_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// tasks_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("cloudflare", Box::new(CloudflareFactory));
}
