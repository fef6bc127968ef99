//! Certificate jobs
//!
//! Both jobs run certbot in a one-shot container that looks like the
//! compose `certbot` service: same image (when the project built one), same
//! mounts, attached to the project's default network.
//!
//! - [`RenewalJob`]: `certbot renew`, then reload the reverse proxy if
//!   certificates changed
//! - [`CertificateStatusJob`]: `certbot certificates`, logged for
//!   observability

pub mod outcome;
pub mod renewal;
pub mod status;

pub use outcome::{RenewalOutcome, classify_renewal_output};
pub use renewal::{ReloadOutcome, RenewalJob, RenewalReport};
pub use status::CertificateStatusJob;

use crate::config::CertbotConfig;
use crate::error::Result;
use crate::traits::{
    ContainerRuntime, ImageSummary, LabelFilter, MountInfo, MountKind, RunSpec, VolumeBinding,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Variable lookup used to build the forwarded environment
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves how to run certbot for the compose project
#[derive(Clone)]
pub struct Certbot {
    runtime: Arc<dyn ContainerRuntime>,
    config: CertbotConfig,
    env_lookup: EnvLookup,
}

impl fmt::Debug for Certbot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certbot")
            .field("runtime", &self.runtime.runtime_name())
            .field("config", &self.config)
            .finish()
    }
}

impl Certbot {
    /// Create a resolver reading forwarded variables from the process environment
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: CertbotConfig) -> Self {
        Self {
            runtime,
            config,
            env_lookup: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the variable lookup used for forwarded credentials
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env_lookup = Arc::new(lookup);
        self
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn config(&self) -> &CertbotConfig {
        &self.config
    }

    /// Pick the image to run
    ///
    /// Prefers an image built by the compose project; falls back to the
    /// configured public image with a warning.
    pub async fn resolve_image(&self) -> Result<String> {
        let images = self.runtime.list_images().await?;

        match select_project_image(&images, &self.config.project) {
            Some(tag) => {
                info!("Using certbot image: {}", tag);
                Ok(tag)
            }
            None => {
                warn!(
                    "Custom certbot image not found, using {}",
                    self.config.fallback_image
                );
                Ok(self.config.fallback_image.clone())
            }
        }
    }

    /// Mounts of the compose certbot container, or the default certificate volume
    pub async fn resolve_volumes(&self) -> Result<Vec<VolumeBinding>> {
        let filter =
            LabelFilter::compose_service(&self.config.project, &self.config.certbot_service);
        let containers = self.runtime.list_containers(&filter, true).await?;

        let volumes = match containers.first() {
            Some(container) => {
                debug!(
                    "Copying mounts from {} container {}",
                    self.config.certbot_service,
                    container.short_id()
                );
                bindings_from_mounts(&container.mounts)
            }
            None => {
                debug!(
                    "No {} container found, using default certificate volume",
                    self.config.certbot_service
                );
                vec![VolumeBinding::new(
                    self.config.default_volume_name(),
                    self.config.certs_path.clone(),
                    "rw",
                )]
            }
        };

        debug!("Using volumes: {:?}", volumes);
        Ok(volumes)
    }

    /// Credential variables to forward, only those actually set
    pub fn environment(&self) -> Vec<(String, String)> {
        self.config
            .forwarded_env
            .iter()
            .filter_map(|key| (self.env_lookup)(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Build the one-shot container for a certbot subcommand
    pub async fn prepare(&self, command: &[&str]) -> Result<RunSpec> {
        let image = self.resolve_image().await?;
        let volumes = self.resolve_volumes().await?;

        Ok(RunSpec {
            image,
            command: command.iter().map(|s| s.to_string()).collect(),
            volumes,
            network: self.config.network_name(),
            environment: self.environment(),
        })
    }
}

/// First tag that names both the project and certbot
pub fn select_project_image(images: &[ImageSummary], project: &str) -> Option<String> {
    images
        .iter()
        .flat_map(|image| image.tags.iter())
        .find(|tag| tag.contains(project) && tag.contains("certbot"))
        .cloned()
}

/// Translate inspected mounts into bindings for a new container
///
/// Named volumes are always mounted read-write; bind mounts keep their mode.
/// Other mount kinds are not carried over.
pub fn bindings_from_mounts(mounts: &[MountInfo]) -> Vec<VolumeBinding> {
    mounts
        .iter()
        .filter_map(|mount| match mount.kind {
            MountKind::Volume => mount
                .name
                .as_ref()
                .map(|name| VolumeBinding::new(name.clone(), mount.destination.clone(), "rw")),
            MountKind::Bind => mount.source.as_ref().map(|source| {
                let mode = mount
                    .mode
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .unwrap_or("rw");
                VolumeBinding::new(source.clone(), mount.destination.clone(), mode)
            }),
            MountKind::Other(_) => None,
        })
        .collect()
}
