//! Job dispatching core.
//!
//! - [`Dispatcher`]: processor registry, busy-set and the assignment loop
//! - [`Queue`]: contract for the external job queue, with [`JobQueue`] as
//!   the in-memory implementation
//! - [`Processor`]: contract for whatever actually runs a job

pub mod dispatcher;
pub mod job;
pub mod processor;
pub mod queue;

pub use dispatcher::Dispatcher;
pub use job::{Job, JobOutcome, JobStatus};
pub use processor::{Processor, ProcessorId};
pub use queue::{JobQueue, Queue};
