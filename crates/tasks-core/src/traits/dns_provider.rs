// # DNS Provider Trait
//
// Defines the interface for reading and updating DNS records via provider APIs.
//
// ## Implementations
//
// - Cloudflare: `tasks-provider-cloudflare` crate
// - Route53: `tasks-provider-route53` crate
//
// ## Usage
//
// ```rust,ignore
// use tasks_core::traits::{DnsProvider, RecordType};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let existing = provider.get_record("home.example.com", RecordType::A).await?;
//     provider.upsert_record(
//         "home.example.com",
//         RecordType::A,
//         std::net::IpAddr::from([1, 2, 3, 5]),
//         300,
//         existing.as_ref(),
//     ).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::ip_source::IpVersion;

/// DNS record type managed by the DDNS jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    #[serde(rename = "A")]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Record type carrying addresses of `version`
    pub fn for_version(version: IpVersion) -> Self {
        match version {
            IpVersion::V4 => RecordType::A,
            IpVersion::V6 => RecordType::Aaaa,
        }
    }

    /// Wire name used by provider APIs
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about a DNS record as published by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    /// The record ID (provider-specific; Route53 has none)
    pub id: Option<String>,
    /// The record name
    pub name: String,
    /// The record type
    pub record_type: RecordType,
    /// The first published value
    pub value: String,
    /// Time-to-live for the record
    pub ttl: Option<u32>,
    /// Any additional provider-specific metadata
    pub extra: serde_json::Value,
}

impl RecordMetadata {
    /// Whether the published value is the same address as `ip`
    ///
    /// Values are compared as parsed addresses so that different textual
    /// forms of one IPv6 address compare equal. An unparsable value never
    /// matches.
    pub fn points_to(&self, ip: &IpAddr) -> bool {
        self.value
            .trim()
            .parse::<IpAddr>()
            .map(|current| current == *ip)
            .unwrap_or(false)
    }
}

/// Result of an upsert call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpsertReceipt {
    /// Provider change identifier, when the provider tracks propagation
    pub change_id: Option<String>,
}

/// Propagation state of a submitted change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    /// Change accepted but not yet visible on all name servers
    Pending,
    /// Change fully propagated
    InSync,
}

/// Trait for DNS provider implementations
///
/// This trait is the single capability interface the DDNS job orchestrates:
/// look up the current value, upsert a new value, and optionally report
/// propagation status.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry, backoff or propagation polling (owned by `DdnsJob`)
/// - ❌ Decide whether an update is needed (owned by `DdnsJob`)
/// - ❌ Create records that do not exist
/// - ❌ Cache state beyond a single request
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up the currently published record for (name, type)
    ///
    /// # Returns
    ///
    /// - `Ok(Some(RecordMetadata))`: The record and its current value
    /// - `Ok(None)`: The provider treats a miss as "no current value"
    /// - `Err(Error)`: The provider treats the lookup failure as fatal
    async fn get_record(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordMetadata>, crate::Error>;

    /// Point (name, type) at `new_ip`
    ///
    /// `existing` is the record returned by a preceding [`get_record`] call;
    /// providers that address records by ID require it.
    ///
    /// [`get_record`]: DnsProvider::get_record
    async fn upsert_record(
        &self,
        record_name: &str,
        record_type: RecordType,
        new_ip: IpAddr,
        ttl: u32,
        existing: Option<&RecordMetadata>,
    ) -> Result<UpsertReceipt, crate::Error>;

    /// Report propagation status of a change returned by `upsert_record`
    ///
    /// Providers without asynchronous propagation keep the default.
    async fn change_status(&self, _change_id: &str) -> Result<ChangeStatus, crate::Error> {
        Ok(ChangeStatus::InSync)
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
#[async_trait]
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    ///
    /// Returns `Error::Config` when the configuration is incomplete.
    async fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
