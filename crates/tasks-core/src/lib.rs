// # tasks-core
//
// Core library for the server maintenance task scheduler.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for discovering the host's public address
// - **DnsProvider**: Trait for reading and upserting DNS records
// - **ContainerRuntime**: Trait for the container engine calls the jobs need
// - **Job**: A unit of scheduled work
// - **DdnsJob**: Keeps one record per provider pointed at the public address
// - **RenewalJob / CertificateStatusJob**: certbot in one-shot containers
// - **ContainerStatusJob**: Snapshot of the compose project's containers
// - **Scheduler**: Fixed-interval triggers, overlap control, shutdown
// - **ProviderRegistry**: Plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Job logic is separate from provider and
//    runtime implementations
// 2. **Plugin-Based**: Providers are registered by name, no hard-coded if-else
// 3. **Library-First**: The daemon only wires settings to jobs
// 4. **Idempotency**: Records are written only when their value differs

pub mod certbot;
pub mod config;
pub mod containers;
pub mod ddns;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod traits;

// Re-export core types for convenience
pub use certbot::{Certbot, CertificateStatusJob, RenewalJob};
pub use config::{CertbotConfig, DdnsTarget, ProviderConfig, ScheduleConfig, Settings};
pub use containers::{ContainerStatusJob, ServiceStatus, restart_service};
pub use ddns::{DdnsJob, DdnsReport, PropagationPolicy};
pub use error::{Error, Result};
pub use registry::ProviderRegistry;
pub use scheduler::{Dispatch, Scheduler, Trigger};
pub use traits::{ContainerRuntime, DnsProvider, IpSource, Job};
