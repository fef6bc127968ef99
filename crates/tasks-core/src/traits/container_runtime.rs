// # Container Runtime Trait
//
// Defines the subset of a container engine's management API the
// certificate and container jobs rely on.
//
// ## Implementations
//
// - Docker Engine API: `tasks-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use tasks_core::traits::{ContainerRuntime, LabelFilter};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let runtime = /* ContainerRuntime implementation */;
//
//     let filter = LabelFilter::compose_service("server_mgmt", "nginx");
//     for container in runtime.list_containers(&filter, false).await? {
//         println!("{} {}", container.short_id(), container.status);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;

/// Label carrying the compose project name
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Label carrying the compose service name
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Exact-match label filter; every pair must be present on a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Vec<(String, String)>,
}

impl LabelFilter {
    /// Create an empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required `key=value` label
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// All containers of a compose project
    pub fn compose_project(project: &str) -> Self {
        Self::new().with(COMPOSE_PROJECT_LABEL, project)
    }

    /// Containers of one compose service within a project
    pub fn compose_service(project: &str, service: &str) -> Self {
        Self::compose_project(project).with(COMPOSE_SERVICE_LABEL, service)
    }

    /// Required label pairs
    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    /// Filter values in the runtime's `key=value` syntax
    pub fn to_filter_values(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    /// Whether a label set satisfies every pair of this filter
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// A locally available image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSummary {
    /// Image ID
    pub id: String,
    /// Repository tags, e.g. `server_mgmt-certbot:latest`
    pub tags: Vec<String>,
}

/// Kind of a container mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountKind {
    /// Named volume
    Volume,
    /// Host path bind mount
    Bind,
    /// tmpfs, npipe, cluster...
    Other(String),
}

/// A mount as reported by container inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub kind: MountKind,
    /// Volume name (volumes only)
    pub name: Option<String>,
    /// Host path or volume data path
    pub source: Option<String>,
    /// Path inside the container
    pub destination: String,
    /// Mount mode as reported (`rw`, `ro`, `z`, or empty)
    pub mode: Option<String>,
}

/// Runtime-reported metadata of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    /// Full container ID
    pub id: String,
    /// Primary name without the leading slash
    pub name: String,
    /// Image reference the container was created from
    pub image: Option<String>,
    /// ID of the image the container runs
    pub image_id: Option<String>,
    /// Runtime state (`running`, `exited`, ...)
    pub status: String,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<MountInfo>,
}

impl ContainerDescriptor {
    /// First 12 characters of the ID, as the docker CLI prints it
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(idx, _)| idx)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }

    /// Compose service label, if any
    pub fn service(&self) -> Option<&str> {
        self.labels.get(COMPOSE_SERVICE_LABEL).map(String::as_str)
    }
}

/// A volume or bind mount handed to a new container
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeBinding {
    /// Volume name or host path
    pub source: String,
    /// Path inside the container
    pub destination: String,
    /// `rw` or `ro` (or another mode string the runtime accepts)
    pub mode: String,
}

impl VolumeBinding {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mode: mode.into(),
        }
    }

    /// Binding in `source:destination:mode` syntax
    pub fn to_bind_spec(&self) -> String {
        format!("{}:{}:{}", self.source, self.destination, self.mode)
    }
}

/// Everything needed to run a one-shot container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    pub command: Vec<String>,
    pub volumes: Vec<VolumeBinding>,
    /// Network to attach the container to
    pub network: String,
    pub environment: Vec<(String, String)>,
}

/// Captured output of a container that exited with code 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// stdout and stderr interleaved in arrival order
    pub output: String,
    /// stderr alone
    pub stderr: String,
}

/// Result of a command executed inside a running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

/// Trait for container runtime implementations
///
/// # Trust Level: Untrusted
///
/// Runtimes translate calls into engine API requests. They never decide
/// which image, volumes or command to use; that is owned by the jobs.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List locally available images
    async fn list_images(&self) -> Result<Vec<ImageSummary>, crate::Error>;

    /// List containers matching every label in `filter`
    ///
    /// Stopped containers are included only when `include_stopped` is set.
    async fn list_containers(
        &self,
        filter: &LabelFilter,
        include_stopped: bool,
    ) -> Result<Vec<ContainerDescriptor>, crate::Error>;

    /// Run a container to completion and remove it afterwards
    ///
    /// # Returns
    ///
    /// - `Ok(RunOutput)`: The container exited with code 0
    /// - `Err(Error::ContainerExit)`: Non-zero exit, with captured stderr
    /// - `Err(Error)`: Any other runtime failure
    async fn run_to_completion(&self, spec: &RunSpec) -> Result<RunOutput, crate::Error>;

    /// Execute `command` inside a running container
    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
    ) -> Result<ExecOutput, crate::Error>;

    /// Restart a container
    async fn restart(&self, container_id: &str) -> Result<(), crate::Error>;

    /// Get the runtime name (for logging)
    fn runtime_name(&self) -> &'static str;
}
