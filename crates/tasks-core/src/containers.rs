//! Compose container status and restart

use crate::error::Result;
use crate::traits::{ContainerRuntime, Job, LabelFilter};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info};

/// Status of one compose service's container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub name: String,
    /// Short container ID
    pub id: String,
    /// First tag of the container's image, or `unknown`
    pub image: String,
}

/// Periodic snapshot of every container in the compose project
pub struct ContainerStatusJob {
    runtime: Arc<dyn ContainerRuntime>,
    project: String,
}

impl ContainerStatusJob {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, project: impl Into<String>) -> Self {
        Self {
            runtime,
            project: project.into(),
        }
    }

    /// Status keyed by service name
    ///
    /// Errors are logged and produce an empty map.
    pub async fn snapshot(&self) -> BTreeMap<String, ServiceStatus> {
        match self.collect().await {
            Ok(statuses) => statuses,
            Err(e) => {
                error!("Error getting container status: {}", e);
                BTreeMap::new()
            }
        }
    }

    async fn collect(&self) -> Result<BTreeMap<String, ServiceStatus>> {
        let filter = LabelFilter::compose_project(&self.project);
        let containers = self.runtime.list_containers(&filter, true).await?;

        // Current first tag per image ID; untagged images report "unknown"
        let first_tags: HashMap<String, String> = self
            .runtime
            .list_images()
            .await?
            .into_iter()
            .filter_map(|image| {
                let tag = image.tags.into_iter().next()?;
                Some((image.id, tag))
            })
            .collect();

        let mut statuses = BTreeMap::new();
        for container in containers {
            let service = container.service().unwrap_or("unknown").to_string();
            let image = container
                .image_id
                .as_ref()
                .and_then(|id| first_tags.get(id))
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            statuses.insert(
                service,
                ServiceStatus {
                    status: container.status.clone(),
                    name: container.name.clone(),
                    id: container.short_id().to_string(),
                    image,
                },
            );
        }
        Ok(statuses)
    }
}

#[async_trait]
impl Job for ContainerStatusJob {
    fn id(&self) -> &str {
        "container-status"
    }

    async fn run(&self) -> Result<()> {
        let statuses = self.snapshot().await;
        info!("Project {}: {} service(s)", self.project, statuses.len());
        for (service, status) in &statuses {
            info!(
                "  {}: {} ({} {}, image {})",
                service, status.status, status.name, status.id, status.image
            );
        }
        Ok(())
    }
}

/// Restart every running container of a compose service
///
/// Returns how many containers were restarted; zero means none was running,
/// which is logged as an error.
pub async fn restart_service(
    runtime: &dyn ContainerRuntime,
    project: &str,
    service: &str,
) -> Result<usize> {
    let filter = LabelFilter::compose_service(project, service);
    let containers = runtime.list_containers(&filter, false).await?;

    if containers.is_empty() {
        error!("No running containers found for service {}", service);
        return Ok(0);
    }

    for container in &containers {
        runtime.restart(&container.id).await?;
        info!("Restarted container {}", container.name);
    }
    Ok(containers.len())
}
