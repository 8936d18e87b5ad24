pub mod config;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use error::{DispatchError, Result};
pub use scheduler::{
    Dispatcher, Job, JobOutcome, JobQueue, JobStatus, Processor, ProcessorId, Queue,
};
