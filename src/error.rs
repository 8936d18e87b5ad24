use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::{JobStatus, ProcessorId};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Processor {0} not found")]
    ProcessorNotFound(ProcessorId),

    #[error("Cannot assign job {job_id} to processor {processor_id}, processor busy with {running_job}")]
    ProcessorBusy {
        processor_id: ProcessorId,
        job_id: Uuid,
        running_job: Uuid,
    },

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job {job_id} is {status}, expected running")]
    JobNotRunning { job_id: Uuid, status: JobStatus },

    #[error("Job queue at capacity ({0} jobs)")]
    QueueFull(usize),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Job execution failed: {0}")]
    Execution(String),

    #[error("Assignment loop already started")]
    LoopAlreadyStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
