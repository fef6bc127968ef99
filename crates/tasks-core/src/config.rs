//! Configuration types for the maintenance task system
//!
//! Settings are read once at startup from environment variables and are
//! read-only afterwards. [`Settings::from_lookup`] takes the variable lookup
//! as a closure so tests never touch the process environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Compose project used when `COMPOSE_PROJECT_NAME` is unset
pub const DEFAULT_COMPOSE_PROJECT: &str = "server_mgmt";

/// TTL applied to DDNS records when none is configured
pub const DEFAULT_TTL: u32 = 300;

/// Upper bound accepted for record TTLs (one day)
pub const MAX_TTL: u32 = 86_400;

/// Longest accepted cadence for minute-based jobs (one year)
pub const MAX_INTERVAL_MIN: u64 = 366 * 24 * 60;

/// Longest accepted cadence for hour-based jobs (one year)
pub const MAX_INTERVAL_HOURS: u64 = 366 * 24;

/// Credential variables forwarded into the certbot container (DNS-01)
pub const FORWARDED_CERTBOT_ENV: &[&str] =
    &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_DEFAULT_REGION"];

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// DDNS providers to keep in sync, one job each
    pub ddns: Vec<ProviderConfig>,

    /// Job cadences
    pub schedule: ScheduleConfig,

    /// Certificate and compose container settings
    pub certbot: CertbotConfig,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    ///
    /// Values are trimmed and empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        // Unset selects the default; set but blank disables DDNS
        let providers = lookup("DDNS_PROVIDERS").unwrap_or_else(|| "route53".to_string());
        let mut ddns = Vec::new();
        for name in providers
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        {
            let config = match name.as_str() {
                "cloudflare" => ProviderConfig::Cloudflare {
                    api_token: var("CF_API_TOKEN"),
                    zone_id: var("CF_ZONE_ID"),
                    record_name: var("CF_DNS_NAME"),
                    ttl: parse_number(&var, "CF_TTL", DEFAULT_TTL)?,
                    proxied: parse_flag(&var, "CF_PROXIED"),
                    ipv6: parse_flag(&var, "CF_IPV6"),
                },
                "route53" => ProviderConfig::Route53 {
                    hosted_zone_id: var("R53_HOSTED_ZONE_ID"),
                    record_name: var("R53_DNS_NAME"),
                    ttl: parse_number(&var, "R53_TTL", DEFAULT_TTL)?,
                    ipv6: parse_flag(&var, "R53_IPV6"),
                    region: var("AWS_REGION"),
                },
                other => {
                    return Err(Error::config(format!(
                        "DDNS_PROVIDERS contains unsupported provider '{}'. \
                        Supported providers: route53, cloudflare",
                        other
                    )));
                }
            };
            if ddns
                .iter()
                .any(|c: &ProviderConfig| c.type_name() == config.type_name())
            {
                continue;
            }
            ddns.push(config);
        }

        let schedule = ScheduleConfig {
            ddns_interval_min: parse_number(&var, "DDNS_INTERVAL_MIN", 5)?,
            renew_interval_hours: parse_number(&var, "CERTBOT_RENEW_INTERVAL_HOURS", 24)?,
            status_interval_hours: parse_number(&var, "CERTBOT_STATUS_INTERVAL_HOURS", 24)?,
            container_status_interval_min: parse_number(
                &var,
                "CONTAINER_STATUS_INTERVAL_MIN",
                0,
            )?,
        };

        let certbot = CertbotConfig {
            project: var("COMPOSE_PROJECT_NAME")
                .unwrap_or_else(|| DEFAULT_COMPOSE_PROJECT.to_string()),
            certbot_service: var("CERTBOT_SERVICE").unwrap_or_else(|| "certbot".to_string()),
            proxy_service: var("PROXY_SERVICE").unwrap_or_else(|| "nginx".to_string()),
            fallback_image: var("CERTBOT_FALLBACK_IMAGE")
                .unwrap_or_else(|| "certbot/certbot".to_string()),
            ..CertbotConfig::default()
        };

        let settings = Self {
            ddns,
            schedule,
            certbot,
            log_level: var("TASKS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        for provider in &self.ddns {
            provider.validate()?;
        }

        self.schedule.validate()?;

        if self.certbot.project.is_empty() {
            return Err(Error::config("COMPOSE_PROJECT_NAME cannot be empty"));
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(Error::config(format!(
                    "TASKS_LOG_LEVEL '{}' is not valid. \
                    Valid levels: trace, debug, info, warn, error",
                    self.log_level
                )));
            }
        }

        Ok(())
    }

    /// Compose project name
    pub fn compose_project(&self) -> &str {
        &self.certbot.project
    }
}

fn parse_number<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            Error::config(format!(
                "{} must be a non-negative integer. Got: {}",
                key, raw
            ))
        }),
    }
}

fn parse_flag<F>(var: &F, key: &str) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Job cadences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// DDNS cadence in minutes
    pub ddns_interval_min: u64,
    /// Certificate renewal cadence in hours
    pub renew_interval_hours: u64,
    /// Certificate status cadence in hours, 0 disables the job
    pub status_interval_hours: u64,
    /// Container status cadence in minutes, 0 disables the job
    pub container_status_interval_min: u64,
}

impl ScheduleConfig {
    /// Validate the cadences
    pub fn validate(&self) -> Result<()> {
        if self.ddns_interval_min == 0 {
            return Err(Error::config("DDNS_INTERVAL_MIN must be > 0"));
        }
        if self.renew_interval_hours == 0 {
            return Err(Error::config("CERTBOT_RENEW_INTERVAL_HOURS must be > 0"));
        }

        let minutes = [
            ("DDNS_INTERVAL_MIN", self.ddns_interval_min),
            ("CONTAINER_STATUS_INTERVAL_MIN", self.container_status_interval_min),
        ];
        for (key, value) in minutes {
            if value > MAX_INTERVAL_MIN {
                return Err(Error::config(format!(
                    "{} must be at most {} minutes. Got: {}",
                    key, MAX_INTERVAL_MIN, value
                )));
            }
        }

        let hours = [
            ("CERTBOT_RENEW_INTERVAL_HOURS", self.renew_interval_hours),
            ("CERTBOT_STATUS_INTERVAL_HOURS", self.status_interval_hours),
        ];
        for (key, value) in hours {
            if value > MAX_INTERVAL_HOURS {
                return Err(Error::config(format!(
                    "{} must be at most {} hours. Got: {}",
                    key, MAX_INTERVAL_HOURS, value
                )));
            }
        }

        Ok(())
    }

    pub fn ddns_interval(&self) -> Duration {
        minutes(self.ddns_interval_min)
    }

    pub fn renew_interval(&self) -> Duration {
        hours(self.renew_interval_hours)
    }

    /// `None` when the status job is disabled
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_hours > 0).then(|| hours(self.status_interval_hours))
    }

    /// `None` when the container status job is disabled
    pub fn container_status_interval(&self) -> Option<Duration> {
        (self.container_status_interval_min > 0)
            .then(|| minutes(self.container_status_interval_min))
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

fn hours(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(3600))
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ddns_interval_min: 5,
            renew_interval_hours: 24,
            status_interval_hours: 24,
            container_status_interval_min: 0,
        }
    }
}

/// DNS provider configuration
///
/// Credentials stay optional here: an incomplete provider still gets a job,
/// which warns and skips on every tick instead of failing startup.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token (`CF_API_TOKEN`)
        #[serde(skip_serializing)]
        api_token: Option<String>,
        /// Zone ID (`CF_ZONE_ID`)
        zone_id: Option<String>,
        /// Record to keep in sync (`CF_DNS_NAME`)
        record_name: Option<String>,
        ttl: u32,
        /// Whether the record is proxied through Cloudflare
        proxied: bool,
        /// Also manage the AAAA record
        ipv6: bool,
    },

    /// AWS Route53 provider
    Route53 {
        /// Hosted zone ID (`R53_HOSTED_ZONE_ID`)
        hosted_zone_id: Option<String>,
        /// Record to keep in sync (`R53_DNS_NAME`)
        record_name: Option<String>,
        ttl: u32,
        /// Also manage the AAAA record
        ipv6: bool,
        /// Client region (`AWS_REGION`); Route53 itself is global
        region: Option<String>,
    },
}

impl ProviderConfig {
    /// Get the provider type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Route53 { .. } => "route53",
        }
    }

    /// Environment variables that are required but unset
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                record_name,
                ..
            } => {
                if api_token.is_none() {
                    missing.push("CF_API_TOKEN");
                }
                if zone_id.is_none() {
                    missing.push("CF_ZONE_ID");
                }
                if record_name.is_none() {
                    missing.push("CF_DNS_NAME");
                }
            }
            ProviderConfig::Route53 {
                hosted_zone_id,
                record_name,
                ..
            } => {
                if hosted_zone_id.is_none() {
                    missing.push("R53_HOSTED_ZONE_ID");
                }
                if record_name.is_none() {
                    missing.push("R53_DNS_NAME");
                }
            }
        }
        missing
    }

    /// The record this provider keeps in sync, once fully configured
    pub fn target(&self) -> Option<DdnsTarget> {
        if !self.missing_fields().is_empty() {
            return None;
        }
        match self {
            ProviderConfig::Cloudflare {
                record_name,
                ttl,
                ipv6,
                ..
            }
            | ProviderConfig::Route53 {
                record_name,
                ttl,
                ipv6,
                ..
            } => record_name.as_ref().map(|name| DdnsTarget {
                record_name: name.clone(),
                ttl: *ttl,
                ipv6: *ipv6,
            }),
        }
    }

    /// Validate the provider configuration
    ///
    /// Missing credentials are not an error (see [`missing_fields`]).
    ///
    /// [`missing_fields`]: ProviderConfig::missing_fields
    pub fn validate(&self) -> Result<()> {
        let ttl = match self {
            ProviderConfig::Cloudflare { ttl, .. } | ProviderConfig::Route53 { ttl, .. } => *ttl,
        };
        if ttl == 0 || ttl > MAX_TTL {
            return Err(Error::config(format!(
                "{} TTL must be between 1 and {} seconds. Got: {}",
                self.type_name(),
                MAX_TTL,
                ttl
            )));
        }
        Ok(())
    }
}

// Custom Debug implementation that hides the API token
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                record_name,
                ttl,
                proxied,
                ipv6,
            } => f
                .debug_struct("Cloudflare")
                .field("api_token", &api_token.as_ref().map(|_| "<REDACTED>"))
                .field("zone_id", zone_id)
                .field("record_name", record_name)
                .field("ttl", ttl)
                .field("proxied", proxied)
                .field("ipv6", ipv6)
                .finish(),
            ProviderConfig::Route53 {
                hosted_zone_id,
                record_name,
                ttl,
                ipv6,
                region,
            } => f
                .debug_struct("Route53")
                .field("hosted_zone_id", hosted_zone_id)
                .field("record_name", record_name)
                .field("ttl", ttl)
                .field("ipv6", ipv6)
                .field("region", region)
                .finish(),
        }
    }
}

/// A fully configured DDNS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdnsTarget {
    /// Fully-qualified record name
    pub record_name: String,
    pub ttl: u32,
    /// Also manage the AAAA record
    pub ipv6: bool,
}

/// Certificate renewal and compose container settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertbotConfig {
    /// Compose project name
    pub project: String,
    /// Compose service running certbot
    pub certbot_service: String,
    /// Compose service running the reverse proxy
    pub proxy_service: String,
    /// Image used when no project-built certbot image exists
    pub fallback_image: String,
    /// Suffix of the default certificate volume (`{project}_{suffix}`)
    pub certs_volume_suffix: String,
    /// Certificate storage path inside the certbot container
    pub certs_path: String,
    /// Command that reloads the proxy configuration in place
    pub reload_command: Vec<String>,
    /// Variables forwarded into the certbot container when set
    pub forwarded_env: Vec<String>,
}

impl CertbotConfig {
    /// Default network of the compose project
    pub fn network_name(&self) -> String {
        format!("{}_default", self.project)
    }

    /// Volume holding certificates when no certbot container exists
    pub fn default_volume_name(&self) -> String {
        format!("{}_{}", self.project, self.certs_volume_suffix)
    }
}

impl Default for CertbotConfig {
    fn default() -> Self {
        Self {
            project: DEFAULT_COMPOSE_PROJECT.to_string(),
            certbot_service: "certbot".to_string(),
            proxy_service: "nginx".to_string(),
            fallback_image: "certbot/certbot".to_string(),
            certs_volume_suffix: "certbot-certs".to_string(),
            certs_path: "/etc/letsencrypt".to_string(),
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            forwarded_env: FORWARDED_CERTBOT_ENV.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.compose_project(), "server_mgmt");
        assert_eq!(settings.certbot.network_name(), "server_mgmt_default");
        assert_eq!(settings.certbot.default_volume_name(), "server_mgmt_certbot-certs");
        assert_eq!(settings.schedule, ScheduleConfig::default());
        assert_eq!(settings.log_level, "info");

        assert_eq!(settings.ddns.len(), 1);
        assert_eq!(settings.ddns[0].type_name(), "route53");
        assert_eq!(
            settings.ddns[0].missing_fields(),
            vec!["R53_HOSTED_ZONE_ID", "R53_DNS_NAME"]
        );
        assert!(settings.ddns[0].target().is_none());
    }

    #[test]
    fn test_route53_target() {
        let settings = settings(&[
            ("R53_HOSTED_ZONE_ID", " Z123 "),
            ("R53_DNS_NAME", "home.example.com"),
            ("R53_TTL", "120"),
            ("R53_IPV6", "Yes"),
        ])
        .unwrap();

        let target = settings.ddns[0].target().unwrap();
        assert_eq!(
            target,
            DdnsTarget {
                record_name: "home.example.com".to_string(),
                ttl: 120,
                ipv6: true,
            }
        );
    }

    #[test]
    fn test_cloudflare_and_route53_together() {
        let settings = settings(&[
            ("DDNS_PROVIDERS", "cloudflare, route53, cloudflare"),
            ("CF_API_TOKEN", "secret"),
            ("CF_ZONE_ID", "zone"),
            ("CF_DNS_NAME", "home.example.com"),
            ("CF_PROXIED", "true"),
        ])
        .unwrap();

        let names: Vec<_> = settings.ddns.iter().map(|p| p.type_name()).collect();
        assert_eq!(names, vec!["cloudflare", "route53"]);
        assert!(settings.ddns[0].target().is_some());
        assert!(matches!(
            settings.ddns[0],
            ProviderConfig::Cloudflare { proxied: true, ipv6: false, ttl: 300, .. }
        ));
    }

    #[test]
    fn test_empty_provider_list_disables_ddns() {
        let blank = settings(&[("DDNS_PROVIDERS", "")]).unwrap();
        assert!(blank.ddns.is_empty());

        let spaces = settings(&[("DDNS_PROVIDERS", "  ")]).unwrap();
        assert!(spaces.ddns.is_empty());

        let unset = settings(&[]).unwrap();
        assert_eq!(unset.ddns.len(), 1);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = settings(&[("DDNS_PROVIDERS", "godaddy")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(settings(&[("DDNS_INTERVAL_MIN", "five")]).is_err());
        assert!(settings(&[("DDNS_INTERVAL_MIN", "0")]).is_err());
        assert!(settings(&[("R53_TTL", "0")]).is_err());
        assert!(settings(&[("R53_TTL", "90000")]).is_err());
        assert!(settings(&[("TASKS_LOG_LEVEL", "loud")]).is_err());
    }

    #[test]
    fn test_oversized_intervals_rejected() {
        let err = settings(&[("DDNS_INTERVAL_MIN", "307445734561825861")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(settings(&[("CERTBOT_RENEW_INTERVAL_HOURS", "5124095576030432")]).is_err());
        assert!(settings(&[("CERTBOT_STATUS_INTERVAL_HOURS", "8785")]).is_err());
        assert!(settings(&[("CONTAINER_STATUS_INTERVAL_MIN", "527041")]).is_err());

        let longest = settings(&[
            ("DDNS_INTERVAL_MIN", "527040"),
            ("CERTBOT_RENEW_INTERVAL_HOURS", "8784"),
        ])
        .unwrap();
        assert_eq!(
            longest.schedule.ddns_interval(),
            Duration::from_secs(527_040 * 60)
        );
        assert_eq!(
            longest.schedule.renew_interval(),
            Duration::from_secs(8_784 * 3600)
        );
    }

    #[test]
    fn test_interval_math_saturates() {
        let schedule = ScheduleConfig {
            ddns_interval_min: u64::MAX,
            renew_interval_hours: u64::MAX,
            ..ScheduleConfig::default()
        };

        assert!(schedule.validate().is_err());
        assert_eq!(schedule.ddns_interval(), Duration::from_secs(u64::MAX));
        assert_eq!(schedule.renew_interval(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_optional_jobs_disabled_by_zero() {
        let settings = settings(&[
            ("CERTBOT_STATUS_INTERVAL_HOURS", "0"),
            ("CONTAINER_STATUS_INTERVAL_MIN", "15"),
        ])
        .unwrap();

        assert!(settings.schedule.status_interval().is_none());
        assert_eq!(
            settings.schedule.container_status_interval(),
            Some(Duration::from_secs(900))
        );
        assert_eq!(settings.schedule.ddns_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let settings = settings(&[
            ("DDNS_PROVIDERS", "cloudflare"),
            ("CF_API_TOKEN", "secret_token_12345"),
        ])
        .unwrap();

        let debug_str = format!("{:?}", settings);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("<REDACTED>"));

        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("secret_token_12345"));
    }
}
