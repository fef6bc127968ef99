// # Job Trait
//
// A job is the unit the scheduler dispatches. Jobs are stateless between
// runs; everything they need is fetched fresh on each invocation.

use async_trait::async_trait;

/// Trait for scheduled jobs
///
/// An `Err` returned from [`Job::run`] is logged by the scheduler together
/// with the job ID and never stops the scheduling loop. Jobs only need to
/// handle errors themselves when a failure has to be reported in a specific
/// way (for example, a container exit code).
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identifier used in logs and scheduler entries
    fn id(&self) -> &str;

    /// Perform one run
    async fn run(&self) -> Result<(), crate::Error>;
}
