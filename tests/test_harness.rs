//! Shared helpers for dispatcher integration tests.
//!
//! Provides polling assertions, processors whose runs can be held open and
//! released on demand, and a queue wrapper that counts and injects failures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use job_dispatch::error::{DispatchError, Result};
use job_dispatch::scheduler::{Job, JobOutcome, JobQueue, JobStatus, Processor, Queue};

/// Poll `condition` until it holds or `timeout_duration` elapses.
pub async fn wait_for<F, Fut>(condition: F, timeout_duration: Duration, poll: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout_duration;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

pub async fn assert_eventually<F, Fut>(condition: F, timeout_duration: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout_duration, Duration::from_millis(10)).await;
    assert!(result, "{}", message);
}

/// Default timeout for eventual assertions
pub const EVENTUALLY: Duration = Duration::from_secs(5);

/// Processor whose runs block until released, one permit per run.
#[derive(Debug)]
pub struct GatedProcessor {
    gate: Semaphore,
    started: Mutex<Vec<Uuid>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail: bool,
}

impl GatedProcessor {
    fn build(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fail,
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// Every run returns an error once released
    pub fn failing() -> Arc<Self> {
        Self::build(true)
    }

    /// Let `runs` held or future runs finish
    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }

    /// Jobs this processor has started, in order
    pub fn started(&self) -> Vec<Uuid> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for GatedProcessor {
    async fn run(&self, job: &Job) -> Result<()> {
        self.started.lock().unwrap().push(job.id);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| DispatchError::Execution(e.to_string()));
        self.active.fetch_sub(1, Ordering::SeqCst);
        permit?.forget();

        if self.fail {
            return Err(DispatchError::Execution(format!("job {} rejected", job.id)));
        }
        Ok(())
    }
}

/// Processor that finishes immediately.
#[derive(Debug, Default)]
pub struct InstantProcessor {
    runs: AtomicUsize,
    panic: bool,
}

impl InstantProcessor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panic: true,
            ..Self::default()
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for InstantProcessor {
    async fn run(&self, _job: &Job) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("processor blew up");
        }
        tokio::task::yield_now().await;
        Ok(())
    }
}

/// In-memory queue that records reports and can be told to fail.
#[derive(Debug)]
pub struct RecordingQueue {
    pub jobs: RwLock<JobQueue>,
    reports: Mutex<HashMap<Uuid, Vec<JobOutcome>>>,
    dequeue_calls: AtomicUsize,
    failing_dequeues: AtomicUsize,
    fail_reports: AtomicBool,
    dequeue_delay_ms: AtomicU64,
}

impl RecordingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(JobQueue::new()),
            reports: Mutex::new(HashMap::new()),
            dequeue_calls: AtomicUsize::new(0),
            failing_dequeues: AtomicUsize::new(0),
            fail_reports: AtomicBool::new(false),
            dequeue_delay_ms: AtomicU64::new(0),
        })
    }

    pub async fn enqueue(&self, command: &str) -> Uuid {
        self.jobs.write().await.enqueue_job(command).unwrap()
    }

    /// Make the next `n` dequeues return an error
    pub fn fail_next_dequeues(&self, n: usize) {
        self.failing_dequeues.store(n, Ordering::SeqCst);
    }

    /// Make every dequeue take at least `delay`
    pub fn slow_dequeues(&self, delay: Duration) {
        self.dequeue_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::SeqCst);
    }

    pub fn dequeue_calls(&self) -> usize {
        self.dequeue_calls.load(Ordering::SeqCst)
    }

    /// Every outcome reported for `job_id`, in order
    pub fn reports_for(&self, job_id: &Uuid) -> Vec<JobOutcome> {
        self.reports
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().values().map(Vec::len).sum()
    }

    pub async fn status(&self, job_id: &Uuid) -> JobStatus {
        self.jobs.read().await.get_job(job_id).unwrap().status
    }

    pub async fn pending(&self) -> usize {
        self.jobs.read().await.pending_jobs().len()
    }

    pub async fn all_terminal(&self) -> bool {
        self.jobs
            .read()
            .await
            .all_jobs()
            .iter()
            .all(|j| j.status.is_terminal())
    }
}

#[async_trait]
impl Queue for RecordingQueue {
    async fn dequeue_job(&self) -> Result<Option<Job>> {
        self.dequeue_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.dequeue_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failing = self
            .failing_dequeues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(DispatchError::Queue("storage unavailable".to_string()));
        }
        Ok(self.jobs.write().await.dequeue())
    }

    async fn mark_job_done(&self, job_id: Uuid, outcome: JobOutcome) -> Result<()> {
        self.reports
            .lock()
            .unwrap()
            .entry(job_id)
            .or_default()
            .push(outcome);

        if self.fail_reports.load(Ordering::SeqCst) {
            return Err(DispatchError::Queue("write rejected".to_string()));
        }
        self.jobs.write().await.mark_done(&job_id, outcome)
    }
}
