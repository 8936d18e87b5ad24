use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::job::Job;

/// Identifier handed out by `Dispatcher::register_processor`.
pub type ProcessorId = u64;

/// Executes jobs on behalf of the dispatcher.
///
/// An error return is a normal `Failed` outcome for the job, not a
/// dispatcher fault. Implementations may be invoked concurrently for
/// different jobs, but the dispatcher never runs two jobs at once on the
/// same registration.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn run(&self, job: &Job) -> Result<()>;
}
