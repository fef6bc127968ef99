// # Route53 DNS Provider
//
// AWS Route53 implementation of `DnsProvider`.
//
// - Lookup: `ListResourceRecordSets` starting at (name, type), one item
// - Update: `ChangeResourceRecordSets` with a single UPSERT
// - Propagation: `GetChange` until `INSYNC` (polled by the DDNS job)
//
// Credentials and region come from the standard AWS provider chain; an
// explicit region only selects the API endpoint, Route53 itself is global.
//
// ## Lookup Semantics
//
// A failed or empty lookup is "no current value": it is logged as a warning
// and the caller goes on to UPSERT, which creates the record if needed.

use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::config::Region;
use aws_sdk_route53::error::DisplayErrorContext;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ChangeStatus as AwsChangeStatus, ResourceRecord,
    ResourceRecordSet, RrType,
};
use std::net::IpAddr;
use tasks_core::config::ProviderConfig;
use tasks_core::traits::{
    ChangeStatus, DnsProvider, DnsProviderFactory, RecordMetadata, RecordType, UpsertReceipt,
};
use tasks_core::{Error, ProviderRegistry, Result};

fn rr_type(record_type: RecordType) -> RrType {
    match record_type {
        RecordType::A => RrType::A,
        RecordType::Aaaa => RrType::Aaaa,
    }
}

/// Compare record names ignoring case and the trailing root dot
pub fn names_match(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Strip the `/change/` prefix Route53 puts on change IDs
pub fn bare_change_id(change_id: &str) -> &str {
    change_id.strip_prefix("/change/").unwrap_or(change_id)
}

/// Turn the first listed record set into metadata, if it is the one asked for
///
/// `ListResourceRecordSets` returns the set at or after the start position,
/// so the name and type must be checked. Only the first value is used.
fn record_from_sets(
    sets: &[ResourceRecordSet],
    record_name: &str,
    record_type: RecordType,
) -> Option<RecordMetadata> {
    let set = sets.first()?;

    if !names_match(set.name(), record_name) || *set.r#type() != rr_type(record_type) {
        return None;
    }

    let value = set.resource_records().first()?.value().to_string();

    Some(RecordMetadata {
        id: None,
        name: record_name.to_string(),
        record_type,
        value,
        ttl: set.ttl().and_then(|ttl| u32::try_from(ttl).ok()),
        extra: serde_json::json!({ "values": set.resource_records().len() }),
    })
}

/// Single-change UPSERT batch
fn upsert_batch(
    record_name: &str,
    record_type: RecordType,
    value: &str,
    ttl: u32,
) -> Result<ChangeBatch> {
    let build_error =
        |e: aws_sdk_route53::error::BuildError| Error::provider("route53", e.to_string());

    let record = ResourceRecord::builder()
        .value(value)
        .build()
        .map_err(build_error)?;

    let set = ResourceRecordSet::builder()
        .name(record_name)
        .r#type(rr_type(record_type))
        .ttl(i64::from(ttl))
        .resource_records(record)
        .build()
        .map_err(build_error)?;

    let change = Change::builder()
        .action(ChangeAction::Upsert)
        .resource_record_set(set)
        .build()
        .map_err(build_error)?;

    ChangeBatch::builder()
        .comment(format!("ddns update for {} -> {}", record_name, value))
        .changes(change)
        .build()
        .map_err(build_error)
}

/// Route53 DNS provider bound to one hosted zone
#[derive(Debug, Clone)]
pub struct Route53Provider {
    client: Client,
    hosted_zone_id: String,
}

impl Route53Provider {
    pub fn new(client: Client, hosted_zone_id: impl Into<String>) -> Self {
        Self {
            client,
            hosted_zone_id: hosted_zone_id.into(),
        }
    }

    /// Build a client from the AWS provider chain
    pub async fn from_env(hosted_zone_id: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), hosted_zone_id)
    }

    pub fn hosted_zone_id(&self) -> &str {
        &self.hosted_zone_id
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn get_record(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordMetadata>> {
        let response = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .start_record_name(record_name)
            .start_record_type(rr_type(record_type))
            .max_items(1)
            .send()
            .await;

        match response {
            Ok(output) => Ok(record_from_sets(
                output.resource_record_sets(),
                record_name,
                record_type,
            )),
            Err(e) => {
                tracing::warn!(
                    "Could not read existing {} for {}: {}",
                    record_type,
                    record_name,
                    DisplayErrorContext(&e)
                );
                Ok(None)
            }
        }
    }

    async fn upsert_record(
        &self,
        record_name: &str,
        record_type: RecordType,
        new_ip: IpAddr,
        ttl: u32,
        _existing: Option<&RecordMetadata>,
    ) -> Result<UpsertReceipt> {
        let batch = upsert_batch(record_name, record_type, &new_ip.to_string(), ttl)?;

        let output = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(&self.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| {
                Error::provider(
                    "route53",
                    format!(
                        "Route53 {} update error: {}",
                        record_type,
                        DisplayErrorContext(&e)
                    ),
                )
            })?;

        let change_id = output.change_info().map(|info| info.id().to_string());
        tracing::debug!(
            "Route53 accepted {} {} -> {} (change {:?})",
            record_type,
            record_name,
            new_ip,
            change_id
        );

        Ok(UpsertReceipt { change_id })
    }

    async fn change_status(&self, change_id: &str) -> Result<ChangeStatus> {
        let output = self
            .client
            .get_change()
            .id(bare_change_id(change_id))
            .send()
            .await
            .map_err(|e| {
                Error::provider(
                    "route53",
                    format!("GetChange failed: {}", DisplayErrorContext(&e)),
                )
            })?;

        match output.change_info().map(|info| info.status()) {
            Some(AwsChangeStatus::Insync) => Ok(ChangeStatus::InSync),
            _ => Ok(ChangeStatus::Pending),
        }
    }

    fn provider_name(&self) -> &'static str {
        "route53"
    }
}

/// Factory for creating Route53 providers
pub struct Route53Factory;

#[async_trait]
impl DnsProviderFactory for Route53Factory {
    async fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Route53 {
                hosted_zone_id: Some(hosted_zone_id),
                region,
                ..
            } => {
                let provider =
                    Route53Provider::from_env(hosted_zone_id.clone(), region.clone()).await;
                Ok(Box::new(provider))
            }
            ProviderConfig::Route53 { .. } => Err(Error::config(format!(
                "Route53 provider needs {}",
                config.missing_fields().join(", ")
            ))),
            _ => Err(Error::config("Invalid config for Route53 provider")),
        }
    }
}

/// Register the Route53 provider with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("route53", Box::new(Route53Factory));
}
