//! Interval scheduler
//!
//! Runs every registered [`Job`] on a fixed interval until a shutdown future
//! resolves.
//!
//! ## Execution Model
//!
//! ```text
//!   sleep_until(next due) ──▶ dispatch due entries ──▶ JoinSet
//!          ▲                                              │
//!          └──────────── reap finished tasks ◀────────────┘
//! ```
//!
//! - The first run of an entry happens one interval after start
//! - Each run is a separate tokio task; the loop never awaits a job
//! - Exclusive entries skip a tick while their previous run is in flight
//! - Job errors and panics are logged with the job id and never stop the loop
//! - On shutdown the loop stops and in-flight runs are aborted

use crate::error::{Error, Result};
use crate::traits::Job;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// When an entry fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed period, first fire one period after start
    Interval(Duration),
}

impl Trigger {
    pub fn minutes(minutes: u64) -> Self {
        Trigger::Interval(Duration::from_secs(minutes.saturating_mul(60)))
    }

    pub fn hours(hours: u64) -> Self {
        Trigger::Interval(Duration::from_secs(hours.saturating_mul(3600)))
    }

    pub fn period(&self) -> Duration {
        match self {
            Trigger::Interval(period) => *period,
        }
    }
}

/// A registered job and its trigger
pub struct JobEntry {
    job: Arc<dyn Job>,
    trigger: Trigger,
    exclusive: bool,
    in_flight: Arc<AtomicBool>,
}

impl JobEntry {
    pub fn id(&self) -> &str {
        self.job.id()
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether an exclusive run is still going
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEntry")
            .field("id", &self.job.id())
            .field("trigger", &self.trigger)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

/// Result of dispatching one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    /// Exclusive entry still running from a previous tick
    SkippedOverlap,
}

/// Clears the in-flight flag when the run ends, including on abort
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
pub struct Scheduler {
    entries: Vec<JobEntry>,
    tasks: JoinSet<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job that may overlap with itself
    pub fn add(&mut self, job: Arc<dyn Job>, trigger: Trigger) -> Result<()> {
        self.push(job, trigger, false)
    }

    /// Register a job that never runs twice at the same time
    pub fn add_exclusive(&mut self, job: Arc<dyn Job>, trigger: Trigger) -> Result<()> {
        self.push(job, trigger, true)
    }

    fn push(&mut self, job: Arc<dyn Job>, trigger: Trigger, exclusive: bool) -> Result<()> {
        if trigger.period().is_zero() {
            return Err(Error::config(format!(
                "job {} needs a non-zero interval",
                job.id()
            )));
        }
        if Instant::now().checked_add(trigger.period()).is_none() {
            return Err(Error::config(format!(
                "job {} interval of {}s is out of range",
                job.id(),
                trigger.period().as_secs()
            )));
        }
        if self.entries.iter().any(|e| e.id() == job.id()) {
            return Err(Error::config(format!("duplicate job id: {}", job.id())));
        }

        self.entries.push(JobEntry {
            job,
            trigger,
            exclusive,
            in_flight: Arc::new(AtomicBool::new(false)),
        });
        Ok(())
    }

    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    /// Number of runs not yet reaped
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Start one run of the entry at `index` as a separate task
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn dispatch(&mut self, index: usize) -> Dispatch {
        let entry = &self.entries[index];

        let guard = if entry.exclusive {
            if entry
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                warn!("Job {} is still running; skipping this run", entry.job.id());
                return Dispatch::SkippedOverlap;
            }
            Some(InFlightGuard(entry.in_flight.clone()))
        } else {
            None
        };

        let job = entry.job.clone();
        self.tasks.spawn(async move {
            let _guard = guard;
            run_job(job).await;
        });
        Dispatch::Started
    }

    /// Tick until `shutdown` resolves, then abort in-flight runs
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let mut next_due: Vec<Instant> = self
            .entries
            .iter()
            .map(|entry| start + entry.trigger.period())
            .collect();

        for entry in &self.entries {
            info!(
                "Scheduled job {} every {}s{}",
                entry.id(),
                entry.trigger.period().as_secs(),
                if entry.exclusive { " (exclusive)" } else { "" }
            );
        }

        tokio::pin!(shutdown);

        loop {
            let Some(wake_at) = next_due.iter().min().copied() else {
                info!("No jobs scheduled; waiting for shutdown");
                shutdown.as_mut().await;
                break;
            };

            tokio::select! {
                _ = shutdown.as_mut() => break,
                _ = sleep_until(wake_at) => {
                    let now = Instant::now();
                    for index in 0..self.entries.len() {
                        if next_due[index] > now {
                            continue;
                        }
                        self.dispatch(index);
                        next_due[index] =
                            next_fire(next_due[index], self.entries[index].trigger.period(), now);
                    }
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        error!("Job task panicked: {}", e);
                    }
                }
            }
        }

        let aborted = self.tasks.len();
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        info!("Scheduler stopped ({} run(s) aborted)", aborted);
    }
}

/// Next fire time strictly after `now`, skipping missed ticks
fn next_fire(due: Instant, period: Duration, now: Instant) -> Instant {
    let mut next = due + period;
    let mut missed = 0u32;
    while next <= now {
        next += period;
        missed += 1;
    }
    if missed > 0 {
        debug!("Skipped {} missed tick(s)", missed);
    }
    next
}

/// Run a job and log its outcome; never fails
async fn run_job(job: Arc<dyn Job>) {
    let id = job.id().to_string();
    debug!("Running job {}", id);

    match AssertUnwindSafe(job.run()).catch_unwind().await {
        Ok(Ok(())) => info!("Job {} finished", id),
        Ok(Err(e)) => error!("Job {} failed: {}", id, e),
        Err(panic) => error!("Job {} panicked: {}", id, panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
