// # Certificate Status Job
//
// Runs `certbot certificates` with the renewal job's image and mounts and
// logs what certbot reports. Read-only.

use async_trait::async_trait;
use tracing::info;

use super::Certbot;
use crate::error::Result;
use crate::traits::Job;

#[derive(Debug, Clone)]
pub struct CertificateStatusJob {
    certbot: Certbot,
}

impl CertificateStatusJob {
    pub fn new(certbot: Certbot) -> Self {
        Self { certbot }
    }

    /// Run `certbot certificates` and return its raw output
    pub async fn check(&self) -> Result<String> {
        info!("Checking certificate status...");

        let spec = self.certbot.prepare(&["certificates"]).await?;
        let output = self.certbot.runtime().run_to_completion(&spec).await?;

        info!("Certificate status check completed");
        info!("Certificate info:\n{}", output.output);
        Ok(output.output)
    }
}

#[async_trait]
impl Job for CertificateStatusJob {
    fn id(&self) -> &str {
        "certbot-status"
    }

    async fn run(&self) -> Result<()> {
        self.check().await.map(|_| ())
    }
}
