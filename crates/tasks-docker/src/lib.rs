// # Docker Container Runtime
//
// Docker Engine API implementation of `ContainerRuntime`, over the local
// socket.
//
// ## One-shot Containers
//
// ```text
// create ──▶ start ──▶ wait ──▶ logs ──▶ remove
// ```
//
// Output is collected after the container exits. A non-zero exit becomes
// `Error::ContainerExit` carrying the stderr stream. A container is only
// force-removed once it has exited; when the wait fails it is left running
// and removal is attempted without force.
//
// ## Timeouts
//
// API requests are bounded by `API_TIMEOUT`. Waiting for a one-shot
// container uses a separate client bounded by `RUN_TIMEOUT`, since a
// renewal with several DNS challenges outlasts a single API call.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::ListImagesOptions;
use bollard::models::{ContainerSummary, HostConfig, MountPoint, MountPointTypeEnum};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tasks_core::traits::{
    ContainerDescriptor, ContainerRuntime, ExecOutput, ImageSummary, LabelFilter, MountInfo,
    MountKind, RunOutput, RunSpec,
};
use tasks_core::{Error, Result};

/// Timeout applied to each Docker API request
pub const API_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest wait for a one-shot container to exit
pub const RUN_TIMEOUT: Duration = Duration::from_secs(3600);

fn docker_error(context: &str, e: bollard::errors::Error) -> Error {
    Error::runtime(format!("{}: {}", context, e))
}

/// Docker Engine runtime
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    /// Same connection with the longer `RUN_TIMEOUT`, for container waits
    waiter: Docker,
}

impl DockerRuntime {
    /// Connect using the local defaults (`DOCKER_HOST` or the unix socket)
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| docker_error("failed to connect to Docker", e))?;
        Ok(Self::from_client(docker))
    }

    pub fn from_client(docker: Docker) -> Self {
        Self {
            waiter: docker.clone().with_timeout(RUN_TIMEOUT),
            docker: docker.with_timeout(API_TIMEOUT),
        }
    }

    /// Start a created container and wait for its exit code
    async fn start_and_wait(&self, id: &str) -> Result<i64> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| docker_error("failed to start container", e))?;

        let mut exit_code = 0;
        let mut waits = std::pin::pin!(
            self.waiter
                .wait_container(id, None::<WaitContainerOptions<String>>)
        );
        while let Some(result) = waits.next().await {
            match result {
                Ok(response) => exit_code = response.status_code,
                // Non-zero exits arrive as this error variant
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    exit_code = code
                }
                Err(e) => return Err(docker_error("failed to wait for container", e)),
            }
        }
        Ok(exit_code)
    }

    /// Collect the logs of an exited container
    async fn collect_logs(&self, id: &str) -> Result<RunOutput> {
        let mut output = RunOutput::default();
        let mut logs = std::pin::pin!(self.docker.logs(
            id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        ));
        while let Some(chunk) = logs.next().await {
            let chunk = chunk.map_err(|e| docker_error("failed to read container logs", e))?;
            append_log(&mut output, chunk);
        }
        Ok(output)
    }
}

/// Removal options for a one-shot container
///
/// Force is used only once the container is known to have exited, so a
/// failed wait never kills a container that is still working.
pub fn removal_options(exited: bool) -> RemoveContainerOptions {
    RemoveContainerOptions {
        force: exited,
        ..Default::default()
    }
}

/// Add a log frame to the combined output, and to stderr when it is one
fn append_log(output: &mut RunOutput, chunk: LogOutput) {
    match chunk {
        LogOutput::StdErr { message } => {
            let text = String::from_utf8_lossy(&message);
            output.output.push_str(&text);
            output.stderr.push_str(&text);
        }
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            output.output.push_str(&String::from_utf8_lossy(&message));
        }
        LogOutput::StdIn { .. } => {}
    }
}

/// Label filters in the Engine API's `filters` shape
pub fn label_filters(filter: &LabelFilter) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    let values = filter.to_filter_values();
    if !values.is_empty() {
        filters.insert("label".to_string(), values);
    }
    filters
}

fn mount_from_point(point: &MountPoint) -> Option<MountInfo> {
    let kind = match &point.typ {
        Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
        Some(MountPointTypeEnum::BIND) => MountKind::Bind,
        Some(other) => MountKind::Other(other.to_string()),
        None => MountKind::Other(String::new()),
    };

    Some(MountInfo {
        kind,
        name: point.name.clone(),
        source: point.source.clone(),
        destination: point.destination.clone()?,
        mode: point.mode.clone(),
    })
}

/// Map a container listing entry; entries without an ID are dropped
pub fn descriptor_from_summary(summary: ContainerSummary) -> Option<ContainerDescriptor> {
    let id = summary.id?;
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.chars().take(12).collect());

    Some(ContainerDescriptor {
        name,
        image: summary.image,
        image_id: summary.image_id,
        status: summary.state.unwrap_or_else(|| "unknown".to_string()),
        labels: summary.labels.unwrap_or_default(),
        mounts: summary
            .mounts
            .unwrap_or_default()
            .iter()
            .filter_map(mount_from_point)
            .collect(),
        id,
    })
}

/// Container configuration for a one-shot run
pub fn container_config(spec: &RunSpec) -> Config<String> {
    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        env: Some(
            spec.environment
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect(),
        ),
        host_config: Some(HostConfig {
            binds: Some(spec.volumes.iter().map(|v| v.to_bind_spec()).collect()),
            network_mode: Some(spec.network.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| docker_error("failed to list images", e))?;

        Ok(images
            .into_iter()
            .map(|image| ImageSummary {
                id: image.id,
                tags: image.repo_tags,
            })
            .collect())
    }

    async fn list_containers(
        &self,
        filter: &LabelFilter,
        include_stopped: bool,
    ) -> Result<Vec<ContainerDescriptor>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: include_stopped,
                filters: label_filters(filter),
                ..Default::default()
            }))
            .await
            .map_err(|e| docker_error("failed to list containers", e))?;

        Ok(containers
            .into_iter()
            .filter_map(descriptor_from_summary)
            .collect())
    }

    async fn run_to_completion(&self, spec: &RunSpec) -> Result<RunOutput> {
        let created = self
            .docker
            .create_container::<String, String>(None, container_config(spec))
            .await
            .map_err(|e| docker_error("failed to create container", e))?;
        for warning in &created.warnings {
            tracing::warn!("Docker: {}", warning);
        }
        tracing::debug!("Created container {} from {}", created.id, spec.image);

        let exited = self.start_and_wait(&created.id).await;
        let output = match &exited {
            Ok(_) => self.collect_logs(&created.id).await,
            Err(_) => Ok(RunOutput::default()),
        };

        let removal = removal_options(exited.is_ok());
        if let Err(e) = self.docker.remove_container(&created.id, Some(removal)).await {
            if exited.is_ok() {
                tracing::warn!("Failed to remove container {}: {}", created.id, e);
            } else {
                tracing::warn!(
                    "Container {} may still be running and was left in place: {}",
                    created.id,
                    e
                );
            }
        }

        let exit_code = exited?;
        let output = output?;
        if exit_code != 0 {
            return Err(Error::container_exit(exit_code, output.stderr));
        }
        Ok(output)
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| docker_error("failed to create exec", e))?;

        let mut collected = RunOutput::default();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| docker_error("failed to start exec", e))?
        {
            while let Some(chunk) = output.next().await {
                let chunk = chunk.map_err(|e| docker_error("failed to read exec output", e))?;
                append_log(&mut collected, chunk);
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| docker_error("failed to inspect exec", e))?;

        Ok(ExecOutput {
            exit_code: inspected.exit_code.unwrap_or(-1),
            output: collected.output,
        })
    }

    async fn restart(&self, container_id: &str) -> Result<()> {
        self.docker
            .restart_container(container_id, None::<RestartContainerOptions>)
            .await
            .map_err(|e| docker_error("failed to restart container", e))
    }

    fn runtime_name(&self) -> &'static str {
        "docker"
    }
}
