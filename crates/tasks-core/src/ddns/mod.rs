//! DDNS job
//!
//! The DdnsJob is responsible for:
//! - Fetching the host's public address via IpSource
//! - Reading the published record via DnsProvider
//! - Updating the record only when the two differ
//! - Waiting for provider-side propagation when the provider tracks it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐        ┌──────────────┐        ┌─────────────┐
//! │  IpSource   │──ip───▶│   DdnsJob    │◀──rec──│ DnsProvider │
//! └─────────────┘        └──────────────┘        └─────────────┘
//!                               │
//!                               ▼ (only on mismatch)
//!                      upsert → poll change status
//! ```
//!
//! ## Run Flow
//!
//! 1. Fetch public IPv4; failure aborts the run
//! 2. Look up the A record; skip if it already points at the address
//! 3. Upsert, then poll propagation (2s interval, 60s budget)
//! 4. If enabled, repeat 1-3 for IPv6; any IPv6 failure is only a warning

use crate::config::DdnsTarget;
use crate::error::{Error, Result};
use crate::traits::{ChangeStatus, DnsProvider, IpSource, IpVersion, Job, RecordType};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long and how often to poll a provider change for propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for PropagationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Propagation state observed after an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    /// Provider does not report propagation
    NotTracked,
    /// Provider confirmed the change is live
    InSync,
    /// Still pending when the polling budget ran out
    TimedOut,
    /// Status could not be read
    Unknown(String),
}

/// Outcome for a single (name, type) record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Record already pointed at the public address; no call was made
    Unchanged { current_ip: IpAddr },
    /// Record was upserted
    Updated {
        /// Previously published value, if the provider reported one
        previous: Option<String>,
        new_ip: IpAddr,
        propagation: Propagation,
    },
}

/// Outcome of the optional IPv6 pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ipv6Outcome {
    Disabled,
    Synced(RecordOutcome),
    /// Best-effort pass failed; the message was logged as a warning
    Failed(String),
}

/// Outcome of one DDNS run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdnsReport {
    /// Required settings missing; nothing was contacted
    Skipped { missing: Vec<&'static str> },
    /// Run completed
    Synced {
        ipv4: RecordOutcome,
        ipv6: Ipv6Outcome,
    },
}

enum Binding {
    Unconfigured {
        missing: Vec<&'static str>,
    },
    Ready {
        provider: Box<dyn DnsProvider>,
        ip_source: Arc<dyn IpSource>,
        target: DdnsTarget,
    },
}

/// Keeps one DNS record in sync with the host's public address
///
/// One job exists per configured provider. The same orchestration runs for
/// every provider; only the [`DnsProvider`] implementation differs.
pub struct DdnsJob {
    id: String,
    provider_name: String,
    binding: Binding,
    propagation: PropagationPolicy,
}

impl DdnsJob {
    /// Create a job for a fully configured provider
    pub fn new(
        provider: Box<dyn DnsProvider>,
        ip_source: Arc<dyn IpSource>,
        target: DdnsTarget,
    ) -> Self {
        let provider_name = provider.provider_name().to_string();
        Self {
            id: format!("ddns-{}", provider_name),
            provider_name,
            binding: Binding::Ready {
                provider,
                ip_source,
                target,
            },
            propagation: PropagationPolicy::default(),
        }
    }

    /// Create a job that only warns about missing settings on every run
    pub fn unconfigured(provider_name: &str, missing: Vec<&'static str>) -> Self {
        Self {
            id: format!("ddns-{}", provider_name),
            provider_name: provider_name.to_string(),
            binding: Binding::Unconfigured { missing },
            propagation: PropagationPolicy::default(),
        }
    }

    /// Override the propagation polling policy
    pub fn with_propagation(mut self, policy: PropagationPolicy) -> Self {
        self.propagation = policy;
        self
    }

    /// Whether the job has everything it needs to contact the provider
    pub fn is_configured(&self) -> bool {
        matches!(self.binding, Binding::Ready { .. })
    }

    /// Perform one synchronization run
    ///
    /// # Returns
    ///
    /// - `Ok(DdnsReport)`: Run finished (including skipped runs)
    /// - `Err(Error)`: IPv4 address fetch, lookup or update failed
    pub async fn sync(&self) -> Result<DdnsReport> {
        let (provider, ip_source, target) = match &self.binding {
            Binding::Unconfigured { missing } => {
                warn!(
                    "DDNS ({}): {} not set; skipping update.",
                    self.provider_name,
                    missing.join(", ")
                );
                return Ok(DdnsReport::Skipped {
                    missing: missing.clone(),
                });
            }
            Binding::Ready {
                provider,
                ip_source,
                target,
            } => (provider.as_ref(), ip_source.as_ref(), target),
        };

        let new_ip4 = ip_source
            .current(IpVersion::V4)
            .await
            .map_err(|e| Error::ip_source(format!("failed to fetch public IPv4: {}", e)))?;

        let ipv4 = self
            .sync_record(provider, target, RecordType::A, new_ip4)
            .await?;

        let ipv6 = if target.ipv6 {
            match self.sync_ipv6(provider, ip_source, target).await {
                Ok(outcome) => Ipv6Outcome::Synced(outcome),
                Err(e) => {
                    warn!("DDNS ({}): skipping IPv6 update: {}", self.provider_name, e);
                    Ipv6Outcome::Failed(e.to_string())
                }
            }
        } else {
            Ipv6Outcome::Disabled
        };

        Ok(DdnsReport::Synced { ipv4, ipv6 })
    }

    async fn sync_ipv6(
        &self,
        provider: &dyn DnsProvider,
        ip_source: &dyn IpSource,
        target: &DdnsTarget,
    ) -> Result<RecordOutcome> {
        let new_ip6 = ip_source.current(IpVersion::V6).await?;
        self.sync_record(provider, target, RecordType::Aaaa, new_ip6)
            .await
    }

    /// Compare the published value with `new_ip` and upsert on mismatch
    async fn sync_record(
        &self,
        provider: &dyn DnsProvider,
        target: &DdnsTarget,
        record_type: RecordType,
        new_ip: IpAddr,
    ) -> Result<RecordOutcome> {
        let name = target.record_name.as_str();
        let existing = provider.get_record(name, record_type).await?;

        if let Some(record) = &existing
            && record.points_to(&new_ip)
        {
            info!(
                "DDNS ({}): {} {} already {}; no change.",
                self.provider_name, record_type, name, new_ip
            );
            return Ok(RecordOutcome::Unchanged { current_ip: new_ip });
        }

        let previous = existing.as_ref().map(|r| r.value.clone());
        debug!(
            "DDNS ({}): {} {} is {:?}, public address is {}",
            self.provider_name, record_type, name, previous, new_ip
        );

        let receipt = provider
            .upsert_record(name, record_type, new_ip, target.ttl, existing.as_ref())
            .await?;

        let propagation = match receipt.change_id {
            Some(change_id) => self.wait_for_propagation(provider, &change_id).await,
            None => Propagation::NotTracked,
        };

        info!(
            "DDNS ({}): updated {} {} -> {} (ttl={})",
            self.provider_name, record_type, name, new_ip, target.ttl
        );

        Ok(RecordOutcome::Updated {
            previous,
            new_ip,
            propagation,
        })
    }

    /// Poll the change until in sync or the budget is spent
    ///
    /// Never fails: an unconfirmed change is only worth a warning.
    async fn wait_for_propagation(
        &self,
        provider: &dyn DnsProvider,
        change_id: &str,
    ) -> Propagation {
        let deadline = Instant::now() + self.propagation.timeout;

        while Instant::now() < deadline {
            match provider.change_status(change_id).await {
                Ok(ChangeStatus::InSync) => {
                    debug!("DDNS ({}): change {} is INSYNC", self.provider_name, change_id);
                    return Propagation::InSync;
                }
                Ok(ChangeStatus::Pending) => {}
                Err(e) => {
                    warn!(
                        "DDNS ({}): could not read status of change {}: {}",
                        self.provider_name, change_id, e
                    );
                    return Propagation::Unknown(e.to_string());
                }
            }
            tokio::time::sleep(self.propagation.poll_interval).await;
        }

        warn!(
            "DDNS ({}): change {} not INSYNC after {}s",
            self.provider_name,
            change_id,
            self.propagation.timeout.as_secs()
        );
        Propagation::TimedOut
    }
}

#[async_trait]
impl Job for DdnsJob {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<()> {
        self.sync().await.map(|_| ())
    }
}
