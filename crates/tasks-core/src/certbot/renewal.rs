// # Certificate Renewal Job
//
// Runs `certbot renew` in a one-shot container and reloads the reverse
// proxy in place when certificates actually changed.
//
// ## Failure Semantics
//
// - Non-zero certbot exit: logged with exit code and stderr, run succeeds
// - Proxy container missing: logged as error, run succeeds
// - Anything else: returned to the scheduler, which logs it

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::Certbot;
use super::outcome::{RenewalOutcome, classify_renewal_output};
use crate::error::{Error, Result};
use crate::traits::{Job, LabelFilter};

/// What the reload step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    /// No running proxy container for the project
    ProxyNotFound,
    /// Reload command exited non-zero
    Failed { exit_code: i64, output: String },
}

/// Outcome of one renewal run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalReport {
    NoRenewalNeeded,
    /// Certificates changed and a reload was attempted
    Renewed(ReloadOutcome),
    /// Output matched no known marker; nothing else was done
    Unrecognized,
    /// certbot exited non-zero
    ContainerFailed { exit_code: i64 },
}

/// Scheduled `certbot renew`
///
/// The scheduler must not run two instances at once; register this job as
/// exclusive.
#[derive(Debug, Clone)]
pub struct RenewalJob {
    certbot: Certbot,
}

impl RenewalJob {
    pub fn new(certbot: Certbot) -> Self {
        Self { certbot }
    }

    /// Perform one renewal pass
    pub async fn renew(&self) -> Result<RenewalReport> {
        info!("Starting certificate renewal process...");

        let spec = self.certbot.prepare(&["renew"]).await?;

        info!("Running certbot renewal container...");
        let output = match self.certbot.runtime().run_to_completion(&spec).await {
            Ok(output) => output,
            Err(Error::ContainerExit { exit_code, stderr }) => {
                error!("Certbot container failed with exit code {}", exit_code);
                error!(
                    "Certbot error output: {}",
                    if stderr.trim().is_empty() {
                        "No stderr"
                    } else {
                        stderr.trim()
                    }
                );
                return Ok(RenewalReport::ContainerFailed { exit_code });
            }
            Err(e) => return Err(e),
        };

        info!("Certificate renewal completed successfully");
        debug!("Certbot output: {}", output.output);

        match classify_renewal_output(&output.output) {
            RenewalOutcome::NoRenewalNeeded => {
                info!("No certificates needed renewal");
                Ok(RenewalReport::NoRenewalNeeded)
            }
            RenewalOutcome::Renewed => {
                info!(
                    "Certificates were renewed, reloading {}...",
                    self.certbot.config().proxy_service
                );
                let reload = self.reload_proxy().await?;
                Ok(RenewalReport::Renewed(reload))
            }
            RenewalOutcome::Unrecognized => {
                info!("Certificate renewal check completed, no action needed");
                Ok(RenewalReport::Unrecognized)
            }
        }
    }

    /// Reload the running proxy container's configuration
    pub async fn reload_proxy(&self) -> Result<ReloadOutcome> {
        let config = self.certbot.config();
        let filter = LabelFilter::compose_service(&config.project, &config.proxy_service);
        let containers = self.certbot.runtime().list_containers(&filter, false).await?;

        let Some(proxy) = containers.first() else {
            error!("{} container not found", config.proxy_service);
            return Ok(ReloadOutcome::ProxyNotFound);
        };

        let result = self
            .certbot
            .runtime()
            .exec(&proxy.id, &config.reload_command)
            .await?;

        if result.exit_code == 0 {
            info!("{} reloaded successfully", config.proxy_service);
            Ok(ReloadOutcome::Reloaded)
        } else {
            let output = if result.output.trim().is_empty() {
                "No output".to_string()
            } else {
                result.output.trim().to_string()
            };
            error!(
                "Failed to reload {} (exit code {}): {}",
                config.proxy_service, result.exit_code, output
            );
            Ok(ReloadOutcome::Failed {
                exit_code: result.exit_code,
                output,
            })
        }
    }
}

#[async_trait]
impl Job for RenewalJob {
    fn id(&self) -> &str {
        "certbot-renewal"
    }

    async fn run(&self) -> Result<()> {
        self.renew().await.map(|_| ())
    }
}
