//! Test doubles and common utilities for contract tests
//!
//! Every double is `Clone` and shares its counters through `Arc`, so a test
//! can hand one copy to the code under test and keep another to assert on.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tasks_core::error::{Error, Result};
use tasks_core::traits::{
    COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, ChangeStatus, ContainerDescriptor,
    ContainerRuntime, DnsProvider, ExecOutput, ImageSummary, IpSource, IpVersion, Job,
    LabelFilter, MountInfo, RecordMetadata, RecordType, RunOutput, RunSpec, UpsertReceipt,
};

/// IP source answering from a fixed table; a missing family is an error
#[derive(Clone, Default)]
pub struct MockIpSource {
    addresses: Arc<Mutex<HashMap<IpVersion, IpAddr>>>,
    calls: Arc<AtomicUsize>,
}

impl MockIpSource {
    pub fn v4(ip: [u8; 4]) -> Self {
        let source = Self::default();
        source.set(IpAddr::from(ip));
        source
    }

    /// Publish `ip` for its family
    pub fn set(&self, ip: IpAddr) {
        self.addresses
            .lock()
            .unwrap()
            .insert(IpVersion::of(&ip), ip);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for MockIpSource {
    async fn current(&self, version: IpVersion) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.addresses
            .lock()
            .unwrap()
            .get(&version)
            .copied()
            .ok_or_else(|| Error::ip_source(format!("no {} address", version)))
    }

    fn source_name(&self) -> &'static str {
        "mock"
    }
}

/// How the mock provider answers lookups that miss or fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Misses are `Ok(None)`
    Lenient,
    /// Misses and failures are errors
    Strict,
}

/// In-memory DNS provider that counts calls
#[derive(Clone)]
pub struct MockDnsProvider {
    pub name: &'static str,
    records: Arc<Mutex<HashMap<(String, RecordType), String>>>,
    failing_types: Arc<Mutex<Vec<RecordType>>>,
    lookup_mode: LookupMode,
    /// `Some(n)`: upserts return a change id that stays pending for n polls
    pending_polls: Option<usize>,
    get_calls: Arc<AtomicUsize>,
    upsert_calls: Arc<AtomicUsize>,
    status_calls: Arc<AtomicUsize>,
    upserts: Arc<Mutex<Vec<(String, RecordType, IpAddr, u32)>>>,
}

impl MockDnsProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            records: Arc::new(Mutex::new(HashMap::new())),
            failing_types: Arc::new(Mutex::new(Vec::new())),
            lookup_mode: LookupMode::Lenient,
            pending_polls: None,
            get_calls: Arc::new(AtomicUsize::new(0)),
            upsert_calls: Arc::new(AtomicUsize::new(0)),
            status_calls: Arc::new(AtomicUsize::new(0)),
            upserts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_lookup_mode(mut self, mode: LookupMode) -> Self {
        self.lookup_mode = mode;
        self
    }

    /// Track propagation; each change reports `Pending` `polls` times
    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = Some(polls);
        self
    }

    pub fn publish(&self, name: &str, record_type: RecordType, value: &str) {
        self.records
            .lock()
            .unwrap()
            .insert((name.to_string(), record_type), value.to_string());
    }

    pub fn published(&self, name: &str, record_type: RecordType) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .get(&(name.to_string(), record_type))
            .cloned()
    }

    /// Make every lookup for `record_type` fail
    pub fn fail_lookups_for(&self, record_type: RecordType) {
        self.failing_types.lock().unwrap().push(record_type);
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_call_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> Vec<(String, RecordType, IpAddr, u32)> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn get_record(
        &self,
        record_name: &str,
        record_type: RecordType,
    ) -> Result<Option<RecordMetadata>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_types.lock().unwrap().contains(&record_type) {
            return match self.lookup_mode {
                LookupMode::Lenient => Ok(None),
                LookupMode::Strict => Err(Error::http("lookup failed")),
            };
        }

        let value = self.published(record_name, record_type);
        match (value, self.lookup_mode) {
            (Some(value), _) => Ok(Some(RecordMetadata {
                id: Some(format!("{}-{}", record_name, record_type)),
                name: record_name.to_string(),
                record_type,
                value,
                ttl: Some(300),
                extra: serde_json::json!({}),
            })),
            (None, LookupMode::Lenient) => Ok(None),
            (None, LookupMode::Strict) => Err(Error::not_found(format!(
                "{} record {}",
                record_type, record_name
            ))),
        }
    }

    async fn upsert_record(
        &self,
        record_name: &str,
        record_type: RecordType,
        new_ip: IpAddr,
        ttl: u32,
        _existing: Option<&RecordMetadata>,
    ) -> Result<UpsertReceipt> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.publish(record_name, record_type, &new_ip.to_string());
        self.upserts
            .lock()
            .unwrap()
            .push((record_name.to_string(), record_type, new_ip, ttl));

        Ok(UpsertReceipt {
            change_id: self.pending_polls.map(|_| format!("C{}", call)),
        })
    }

    async fn change_status(&self, _change_id: &str) -> Result<ChangeStatus> {
        let polls = self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.pending_polls {
            Some(pending) if polls < pending => Ok(ChangeStatus::Pending),
            _ => Ok(ChangeStatus::InSync),
        }
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

/// How the mock runtime finishes a one-shot container
#[derive(Debug, Clone)]
pub enum RunScript {
    Output(String),
    Exit { code: i64, stderr: String },
    Fail(String),
}

/// Container runtime double with a fixed image and container inventory
#[derive(Clone)]
pub struct MockContainerRuntime {
    images: Arc<Mutex<Vec<ImageSummary>>>,
    containers: Arc<Mutex<Vec<ContainerDescriptor>>>,
    run_script: Arc<Mutex<RunScript>>,
    exec_result: Arc<Mutex<ExecOutput>>,
    runs: Arc<Mutex<Vec<RunSpec>>>,
    execs: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    restarts: Arc<Mutex<Vec<String>>>,
    list_failure: Arc<Mutex<Option<String>>>,
}

impl Default for MockContainerRuntime {
    fn default() -> Self {
        Self {
            images: Arc::new(Mutex::new(Vec::new())),
            containers: Arc::new(Mutex::new(Vec::new())),
            run_script: Arc::new(Mutex::new(RunScript::Output(String::new()))),
            exec_result: Arc::new(Mutex::new(ExecOutput {
                exit_code: 0,
                output: String::new(),
            })),
            runs: Arc::new(Mutex::new(Vec::new())),
            execs: Arc::new(Mutex::new(Vec::new())),
            restarts: Arc::new(Mutex::new(Vec::new())),
            list_failure: Arc::new(Mutex::new(None)),
        }
    }
}

impl MockContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a local image and return its ID
    pub fn add_image(&self, tags: &[&str]) -> String {
        let mut images = self.images.lock().unwrap();
        let id = format!("sha256:{:04}", images.len());
        images.push(ImageSummary {
            id: id.clone(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        });
        id
    }

    pub fn add_container(&self, container: ContainerDescriptor) {
        self.containers.lock().unwrap().push(container);
    }

    pub fn script_run(&self, script: RunScript) {
        *self.run_script.lock().unwrap() = script;
    }

    pub fn script_exec(&self, exit_code: i64, output: &str) {
        *self.exec_result.lock().unwrap() = ExecOutput {
            exit_code,
            output: output.to_string(),
        };
    }

    /// Make container listing fail with `message`
    pub fn fail_listing(&self, message: &str) {
        *self.list_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn runs(&self) -> Vec<RunSpec> {
        self.runs.lock().unwrap().clone()
    }

    pub fn execs(&self) -> Vec<(String, Vec<String>)> {
        self.execs.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerRuntime for MockContainerRuntime {
    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(self.images.lock().unwrap().clone())
    }

    async fn list_containers(
        &self,
        filter: &LabelFilter,
        include_stopped: bool,
    ) -> Result<Vec<ContainerDescriptor>> {
        if let Some(message) = self.list_failure.lock().unwrap().clone() {
            return Err(Error::runtime(message));
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| filter.matches(&c.labels))
            .filter(|c| include_stopped || c.status == "running")
            .cloned()
            .collect())
    }

    async fn run_to_completion(&self, spec: &RunSpec) -> Result<RunOutput> {
        self.runs.lock().unwrap().push(spec.clone());
        match self.run_script.lock().unwrap().clone() {
            RunScript::Output(output) => Ok(RunOutput {
                output,
                stderr: String::new(),
            }),
            RunScript::Exit { code, stderr } => Err(Error::container_exit(code, stderr)),
            RunScript::Fail(message) => Err(Error::runtime(message)),
        }
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> Result<ExecOutput> {
        self.execs
            .lock()
            .unwrap()
            .push((container_id.to_string(), command.to_vec()));
        Ok(self.exec_result.lock().unwrap().clone())
    }

    async fn restart(&self, container_id: &str) -> Result<()> {
        self.restarts.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "mock"
    }
}

/// A compose-labelled container
pub fn compose_container(
    id: &str,
    project: &str,
    service: &str,
    status: &str,
    mounts: Vec<MountInfo>,
) -> ContainerDescriptor {
    let mut labels = HashMap::new();
    labels.insert(COMPOSE_PROJECT_LABEL.to_string(), project.to_string());
    labels.insert(COMPOSE_SERVICE_LABEL.to_string(), service.to_string());
    ContainerDescriptor {
        id: id.to_string(),
        name: format!("{}-{}-1", project, service),
        image: Some(format!("{}-{}:latest", project, service)),
        image_id: None,
        status: status.to_string(),
        labels,
        mounts,
    }
}

/// What a [`CountingJob`] does on each run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobBehavior {
    Succeed,
    Fail,
    Panic,
}

/// Job that counts starts and finishes
#[derive(Clone)]
pub struct CountingJob {
    id: String,
    behavior: JobBehavior,
    duration: Duration,
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl CountingJob {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            behavior: JobBehavior::Succeed,
            duration: Duration::ZERO,
            started: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_behavior(mut self, behavior: JobBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Each run sleeps this long before finishing
    pub fn taking(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for CountingJob {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            JobBehavior::Succeed => Ok(()),
            JobBehavior::Fail => Err(Error::runtime("job failed on purpose")),
            JobBehavior::Panic => panic!("job panicked on purpose"),
        }
    }
}
