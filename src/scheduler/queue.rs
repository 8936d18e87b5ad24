use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{DispatchError, Result};
use crate::scheduler::job::{Job, JobOutcome, JobStatus};

/// Source of pending work and sink for completion status.
///
/// The dispatcher serializes its own calls under its registry lock, but an
/// implementation may be shared with other writers and must tolerate that.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Take the next eligible pending job, or `None` when nothing is pending.
    async fn dequeue_job(&self) -> Result<Option<Job>>;

    /// Record the terminal outcome of a job handed out by `dequeue_job`.
    async fn mark_job_done(&self, job_id: Uuid, outcome: JobOutcome) -> Result<()>;
}

/// In-memory FIFO job queue
#[derive(Debug)]
pub struct JobQueue {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
    max_jobs: usize,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_config(&QueueConfig::default())
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self::with_capacity(config.max_jobs)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            max_jobs,
        }
    }

    /// Create a pending job for `command` and return its ID.
    pub fn enqueue_job(&mut self, command: impl Into<String>) -> Result<Uuid> {
        let job = Job::new(command);
        let id = job.id;
        if !self.add_job(job) {
            return Err(DispatchError::QueueFull(self.max_jobs));
        }
        tracing::debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Add a job to the queue. Returns false if the queue is at capacity.
    ///
    /// Only jobs in `Pending` status become eligible for dequeue.
    pub fn add_job(&mut self, job: Job) -> bool {
        if self.is_full() {
            return false;
        }
        if job.status == JobStatus::Pending {
            self.pending.push_back(job.id);
        }
        self.jobs.insert(job.id, job);
        true
    }

    /// Pop the oldest pending job and mark it running.
    pub fn dequeue(&mut self) -> Option<Job> {
        while let Some(id) = self.pending.pop_front() {
            if let Some(job) = self.jobs.get_mut(&id) {
                if job.status != JobStatus::Pending {
                    continue;
                }
                job.status = JobStatus::Running;
                return Some(job.clone());
            }
        }
        None
    }

    /// Move a running job to its terminal status.
    pub fn mark_done(&mut self, id: &Uuid, outcome: JobOutcome) -> Result<()> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or(DispatchError::JobNotFound(*id))?;

        if job.status != JobStatus::Running {
            return Err(DispatchError::JobNotRunning {
                job_id: *id,
                status: job.status,
            });
        }

        job.status = outcome.into();
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Pending jobs in dequeue order
    pub fn pending_jobs(&self) -> Vec<&Job> {
        self.pending
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|j| j.status == JobStatus::Pending)
            .collect()
    }

    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<&Job> {
        self.jobs.values().filter(|j| j.status == status).collect()
    }

    /// Get all jobs sorted chronologically by creation time
    pub fn all_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Returns the current number of jobs in the queue
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Returns true if the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.max_jobs
    }
}

#[async_trait]
impl Queue for RwLock<JobQueue> {
    async fn dequeue_job(&self) -> Result<Option<Job>> {
        Ok(self.write().await.dequeue())
    }

    async fn mark_job_done(&self, job_id: Uuid, outcome: JobOutcome) -> Result<()> {
        self.write().await.mark_done(&job_id, outcome)
    }
}
