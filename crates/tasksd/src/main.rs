// # tasksd - Server Maintenance Daemon
//
// Thin integration layer: reads settings from the environment, wires the
// providers, IP source and container runtime into jobs, and runs the
// scheduler until SIGTERM or SIGINT. All job logic lives in tasks-core.
//
// ## Commands
//
// - `tasksd`: run the scheduler (default)
// - `tasksd restart <service>`: restart the running containers of a compose
//   service and exit
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### DDNS
// - `DDNS_PROVIDERS`: Comma-separated providers (route53, cloudflare)
// - `DDNS_INTERVAL_MIN`: Cadence in minutes
// - `CF_API_TOKEN`, `CF_ZONE_ID`, `CF_DNS_NAME`, `CF_TTL`, `CF_PROXIED`, `CF_IPV6`
// - `R53_HOSTED_ZONE_ID`, `R53_DNS_NAME`, `R53_TTL`, `R53_IPV6`, `AWS_REGION`
//
// ### Certificates and containers
// - `COMPOSE_PROJECT_NAME`: Compose project the jobs operate on
// - `CERTBOT_SERVICE`, `PROXY_SERVICE`, `CERTBOT_FALLBACK_IMAGE`
// - `CERTBOT_RENEW_INTERVAL_HOURS`, `CERTBOT_STATUS_INTERVAL_HOURS`
// - `CONTAINER_STATUS_INTERVAL_MIN`
//
// ### Logging
// - `TASKS_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export DDNS_PROVIDERS=cloudflare
// export CF_API_TOKEN=your_token
// export CF_ZONE_ID=your_zone
// export CF_DNS_NAME=home.example.com
// export COMPOSE_PROJECT_NAME=server_mgmt
//
// tasksd
// ```

use anyhow::{Context, Result};
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tasks_core::traits::{ContainerRuntime, IpSource};
use tasks_core::{
    Certbot, CertificateStatusJob, ContainerStatusJob, DdnsJob, ProviderRegistry, RenewalJob,
    Scheduler, Settings, Trigger,
};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TasksExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<TasksExitCode> for ExitCode {
    fn from(code: TasksExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

const USAGE: &str = "usage: tasksd [restart <service>]";

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the scheduler until a termination signal
    Run,
    /// Restart the running containers of one compose service
    Restart(String),
}

impl Command {
    /// Parse the arguments following the program name
    fn parse(args: &[String]) -> Result<Self> {
        match args {
            [] => Ok(Command::Run),
            [cmd] if cmd == "run" => Ok(Command::Run),
            [cmd, service] if cmd == "restart" && !service.trim().is_empty() => {
                Ok(Command::Restart(service.trim().to_string()))
            }
            _ => anyhow::bail!("unrecognized arguments {:?}. {}", args, USAGE),
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return TasksExitCode::ConfigError.into();
        }
    };

    // Load and validate settings from environment
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return TasksExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TasksExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TasksExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let components = match Components::from_settings(&settings) {
            Ok(components) => components,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return TasksExitCode::ConfigError;
            }
        };

        let result = match command {
            Command::Run => run_daemon(&settings, &components).await,
            Command::Restart(service) => restart(&settings, &components, &service).await,
        };

        match result {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                TasksExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Long-lived clients shared by every job
struct Components {
    registry: ProviderRegistry,
    ip_source: Option<Arc<dyn IpSource>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl Components {
    /// Register providers and connect clients compiled into this build
    fn from_settings(settings: &Settings) -> Result<Self> {
        let registry = ProviderRegistry::new();

        #[cfg(feature = "cloudflare")]
        tasks_provider_cloudflare::register(&registry);

        #[cfg(feature = "route53")]
        tasks_provider_route53::register(&registry);

        info!("Registered DNS providers: {:?}", registry.list_providers());

        #[cfg(feature = "http")]
        let ip_source: Option<Arc<dyn IpSource>> = Some(Arc::new(
            tasks_ip_http::HttpIpSource::new().context("failed to create HTTP IP source")?,
        ));
        #[cfg(not(feature = "http"))]
        let ip_source: Option<Arc<dyn IpSource>> = None;

        #[cfg(feature = "docker")]
        let runtime: Option<Arc<dyn ContainerRuntime>> = Some(Arc::new(
            tasks_docker::DockerRuntime::connect().context("failed to set up Docker client")?,
        ));
        #[cfg(not(feature = "docker"))]
        let runtime: Option<Arc<dyn ContainerRuntime>> = None;

        info!(
            "Compose project {}, {} DDNS provider(s)",
            settings.compose_project(),
            settings.ddns.len()
        );

        Ok(Self {
            registry,
            ip_source,
            runtime,
        })
    }
}

/// Build the scheduler entries from settings
///
/// Providers with missing settings still get a job that warns on every run.
/// Container jobs are left out when no runtime is available.
async fn build_scheduler(settings: &Settings, components: &Components) -> Result<Scheduler> {
    let mut scheduler = Scheduler::new();
    let ddns_every = Trigger::Interval(settings.schedule.ddns_interval());

    for config in &settings.ddns {
        let job = match config.target() {
            None => {
                let missing = config.missing_fields();
                warn!(
                    "{} DDNS is not configured, missing {}",
                    config.type_name(),
                    missing.join(", ")
                );
                DdnsJob::unconfigured(config.type_name(), missing)
            }
            Some(target) => {
                let ip_source = components.ip_source.clone().with_context(|| {
                    format!("{} DDNS needs an IP source, none is built in", config.type_name())
                })?;
                let provider = components
                    .registry
                    .create_provider(config)
                    .await
                    .with_context(|| format!("failed to create {} provider", config.type_name()))?;
                DdnsJob::new(provider, ip_source, target)
            }
        };
        scheduler.add(Arc::new(job), ddns_every)?;
    }

    let Some(runtime) = components.runtime.clone() else {
        warn!("No container runtime available, certificate and container jobs disabled");
        return Ok(scheduler);
    };

    let certbot = Certbot::new(runtime.clone(), settings.certbot.clone());
    scheduler.add_exclusive(
        Arc::new(RenewalJob::new(certbot.clone())),
        Trigger::Interval(settings.schedule.renew_interval()),
    )?;

    if let Some(every) = settings.schedule.status_interval() {
        scheduler.add(
            Arc::new(CertificateStatusJob::new(certbot)),
            Trigger::Interval(every),
        )?;
    }

    if let Some(every) = settings.schedule.container_status_interval() {
        scheduler.add(
            Arc::new(ContainerStatusJob::new(runtime, settings.compose_project())),
            Trigger::Interval(every),
        )?;
    }

    Ok(scheduler)
}

/// Run the scheduler until a termination signal arrives
async fn run_daemon(settings: &Settings, components: &Components) -> Result<TasksExitCode> {
    info!("Starting tasksd daemon");

    let scheduler = build_scheduler(settings, components).await?;
    let shutdown = shutdown_signal()?;

    info!("Scheduler started with {} job(s)", scheduler.entries().len());
    scheduler
        .run_until(async move {
            let signal = shutdown.await;
            info!("Received shutdown signal: {}", signal);
        })
        .await;

    info!("Shutting down daemon");
    Ok(TasksExitCode::CleanShutdown)
}

/// Restart one compose service and report whether anything was restarted
async fn restart(
    settings: &Settings,
    components: &Components,
    service: &str,
) -> Result<TasksExitCode> {
    let runtime = components
        .runtime
        .as_deref()
        .context("restart needs a container runtime, none is built in")?;

    let restarted =
        tasks_core::restart_service(runtime, settings.compose_project(), service).await?;
    if restarted == 0 {
        return Ok(TasksExitCode::RuntimeError);
    }
    Ok(TasksExitCode::CleanShutdown)
}

/// Install handlers for SIGTERM and SIGINT
///
/// Handlers are installed before the scheduler starts, so a failure is a
/// startup error rather than a missed signal later.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Install a handler for Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "SIGINT"
    })
}
