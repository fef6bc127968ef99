//! Core traits for the maintenance task system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Discover the host's public address
//! - [`DnsProvider`]: Read and update DNS records via provider APIs
//! - [`ContainerRuntime`]: Inspect, run and exec containers
//! - [`Job`]: A unit of scheduled work

pub mod ip_source;
pub mod dns_provider;
pub mod container_runtime;
pub mod job;

pub use ip_source::{IpSource, IpVersion};
pub use dns_provider::{
    ChangeStatus, DnsProvider, DnsProviderFactory, RecordMetadata, RecordType, UpsertReceipt,
};
pub use container_runtime::{
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ContainerDescriptor, ContainerRuntime,
    ExecOutput, ImageSummary, LabelFilter, MountInfo, MountKind, RunOutput, RunSpec,
    VolumeBinding,
};
pub use job::Job;
