//! Contract Test: DDNS synchronization
//!
//! Constraints verified:
//! - A record is written only when its value differs from the public address
//! - Missing configuration means no network calls at all
//! - IPv4 failures fail the run; IPv6 failures never do
//! - Propagation polling stops on INSYNC or after its budget
//!
//! If this test fails, DdnsJob is writing records it should not touch or
//! failing runs it should not fail.

mod common;

use common::*;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tasks_core::config::{DdnsTarget, ProviderConfig};
use tasks_core::ddns::{
    DdnsJob, DdnsReport, Ipv6Outcome, Propagation, PropagationPolicy, RecordOutcome,
};
use tasks_core::traits::{Job, RecordType};

const NAME: &str = "home.example.com";

fn target(ipv6: bool) -> DdnsTarget {
    DdnsTarget {
        record_name: NAME.to_string(),
        ttl: 300,
        ipv6,
    }
}

fn job(provider: &MockDnsProvider, ip_source: &MockIpSource, ipv6: bool) -> DdnsJob {
    DdnsJob::new(
        Box::new(provider.clone()),
        Arc::new(ip_source.clone()),
        target(ipv6),
    )
}

#[tokio::test]
async fn changed_address_is_upserted_once() {
    let provider = MockDnsProvider::new("route53");
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);

    let report = job(&provider, &ip_source, false).sync().await.unwrap();

    assert_eq!(
        report,
        DdnsReport::Synced {
            ipv4: RecordOutcome::Updated {
                previous: Some("1.2.3.4".to_string()),
                new_ip: IpAddr::from([1, 2, 3, 5]),
                propagation: Propagation::NotTracked,
            },
            ipv6: Ipv6Outcome::Disabled,
        }
    );
    assert_eq!(
        provider.upserts(),
        vec![(
            NAME.to_string(),
            RecordType::A,
            IpAddr::from([1, 2, 3, 5]),
            300
        )]
    );
}

#[tokio::test]
async fn unchanged_address_makes_no_write() {
    let provider = MockDnsProvider::new("cloudflare");
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    let ip_source = MockIpSource::v4([1, 2, 3, 4]);
    let job = job(&provider, &ip_source, false);

    for _ in 0..3 {
        job.run().await.unwrap();
    }

    assert_eq!(provider.get_call_count(), 3);
    assert_eq!(
        provider.upsert_call_count(),
        0,
        "records already pointing at the public address must not be written"
    );
}

#[tokio::test]
async fn second_run_after_update_is_a_no_op() {
    let provider = MockDnsProvider::new("route53");
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);
    let job = job(&provider, &ip_source, false);

    job.run().await.unwrap();
    job.run().await.unwrap();

    assert_eq!(provider.upsert_call_count(), 1);
    assert_eq!(
        provider.published(NAME, RecordType::A).as_deref(),
        Some("1.2.3.5")
    );
}

#[tokio::test]
async fn missing_configuration_makes_no_calls() {
    let config = ProviderConfig::Cloudflare {
        api_token: None,
        zone_id: Some("zone".to_string()),
        record_name: Some(NAME.to_string()),
        ttl: 300,
        proxied: false,
        ipv6: false,
    };
    assert!(config.target().is_none());

    let job = DdnsJob::unconfigured(config.type_name(), config.missing_fields());
    let report = job.sync().await.unwrap();

    assert_eq!(
        report,
        DdnsReport::Skipped {
            missing: vec!["CF_API_TOKEN"]
        }
    );
}

#[tokio::test]
async fn lenient_lookup_miss_still_updates() {
    // Route53 semantics: a missing record is "no current value"
    let provider = MockDnsProvider::new("route53").with_lookup_mode(LookupMode::Lenient);
    provider.fail_lookups_for(RecordType::A);
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);

    let report = job(&provider, &ip_source, false).sync().await.unwrap();

    assert!(matches!(
        report,
        DdnsReport::Synced {
            ipv4: RecordOutcome::Updated { previous: None, .. },
            ..
        }
    ));
    assert_eq!(provider.upsert_call_count(), 1);
}

#[tokio::test]
async fn strict_lookup_miss_fails_without_write() {
    // Cloudflare semantics: no matching record is an error
    let provider = MockDnsProvider::new("cloudflare").with_lookup_mode(LookupMode::Strict);
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);

    let result = job(&provider, &ip_source, false).sync().await;

    assert!(result.is_err());
    assert_eq!(provider.upsert_call_count(), 0);
}

#[tokio::test]
async fn ipv4_fetch_failure_aborts_before_any_provider_call() {
    let provider = MockDnsProvider::new("route53");
    let ip_source = MockIpSource::default();

    let result = job(&provider, &ip_source, true).sync().await;

    let err = result.err().unwrap();
    assert!(err.to_string().contains("failed to fetch public IPv4"));
    assert_eq!(provider.get_call_count(), 0);
    assert_eq!(ip_source.call_count(), 1, "IPv6 must not be attempted");
}

#[tokio::test]
async fn ipv6_failure_never_affects_ipv4_outcome() {
    let provider = MockDnsProvider::new("route53");
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    // No IPv6 address available
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);

    let report = job(&provider, &ip_source, true).sync().await.unwrap();

    let DdnsReport::Synced { ipv4, ipv6 } = report else {
        panic!("expected a synced report");
    };
    assert!(matches!(ipv4, RecordOutcome::Updated { .. }));
    assert!(matches!(ipv6, Ipv6Outcome::Failed(_)));
    assert_eq!(provider.upsert_call_count(), 1);
}

#[tokio::test]
async fn ipv6_lookup_error_is_isolated() {
    let provider = MockDnsProvider::new("cloudflare").with_lookup_mode(LookupMode::Strict);
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    provider.fail_lookups_for(RecordType::Aaaa);
    let ip_source = MockIpSource::v4([1, 2, 3, 4]);
    ip_source.set("2001:db8::1".parse().unwrap());

    let report = job(&provider, &ip_source, true).sync().await.unwrap();

    assert!(matches!(
        report,
        DdnsReport::Synced {
            ipv4: RecordOutcome::Unchanged { .. },
            ipv6: Ipv6Outcome::Failed(_),
        }
    ));
    assert_eq!(provider.upsert_call_count(), 0);
}

#[tokio::test]
async fn ipv6_values_compare_as_addresses() {
    let provider = MockDnsProvider::new("route53");
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    provider.publish(NAME, RecordType::Aaaa, "2001:0db8:0000::0001");
    let ip_source = MockIpSource::v4([1, 2, 3, 4]);
    ip_source.set("2001:db8::1".parse().unwrap());

    let report = job(&provider, &ip_source, true).sync().await.unwrap();

    assert!(matches!(
        report,
        DdnsReport::Synced {
            ipv4: RecordOutcome::Unchanged { .. },
            ipv6: Ipv6Outcome::Synced(RecordOutcome::Unchanged { .. }),
        }
    ));
    assert_eq!(provider.upsert_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn propagation_is_polled_until_insync() {
    let provider = MockDnsProvider::new("route53").with_pending_polls(2);
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);

    let report = job(&provider, &ip_source, false).sync().await.unwrap();

    assert!(matches!(
        report,
        DdnsReport::Synced {
            ipv4: RecordOutcome::Updated {
                propagation: Propagation::InSync,
                ..
            },
            ..
        }
    ));
    assert_eq!(provider.status_call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn propagation_timeout_is_only_a_warning() {
    let provider = MockDnsProvider::new("route53").with_pending_polls(usize::MAX);
    provider.publish(NAME, RecordType::A, "1.2.3.4");
    let ip_source = MockIpSource::v4([1, 2, 3, 5]);
    let job = job(&provider, &ip_source, false).with_propagation(PropagationPolicy {
        poll_interval: Duration::from_secs(2),
        timeout: Duration::from_secs(10),
    });

    let started = tokio::time::Instant::now();
    let report = job.sync().await.unwrap();

    assert!(matches!(
        report,
        DdnsReport::Synced {
            ipv4: RecordOutcome::Updated {
                propagation: Propagation::TimedOut,
                ..
            },
            ..
        }
    ));
    assert_eq!(provider.status_call_count(), 5);
    assert!(started.elapsed() >= Duration::from_secs(10));
}
