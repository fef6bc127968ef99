// # IP Source Trait
//
// Defines the interface for discovering the host's current public address.
//
// ## Implementations
//
// - HTTP echo services: `tasks-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use tasks_core::traits::{IpSource, IpVersion};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* IpSource implementation */;
//
//     let v4 = source.current(IpVersion::V4).await?;
//     println!("public IPv4: {}", v4);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Version of an already parsed address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    /// Whether `ip` belongs to this address family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        Self::of(ip) == *self
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

/// Trait for public IP source implementations
///
/// An IP source answers a single question: what is the host's public
/// address for a given family right now. Every call is a fresh lookup;
/// implementations must not cache results across calls.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform network I/O to their echo endpoints
/// - ✅ Apply a request timeout
///
/// ## Forbidden Capabilities
/// - ❌ Perform DNS updates (use `DnsProvider`)
/// - ❌ Retry or poll (the scheduler's next tick is the retry)
/// - ❌ Spawn tasks
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current public IP address for `version`
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: An address of the requested family
    /// - `Err(Error)`: If the endpoint failed or returned something else
    async fn current(&self, version: IpVersion) -> Result<IpAddr, crate::Error>;

    /// Name of the source (for logging)
    fn source_name(&self) -> &'static str {
        "ip-source"
    }
}
