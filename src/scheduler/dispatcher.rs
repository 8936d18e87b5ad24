use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::scheduler::job::{Job, JobOutcome};
use crate::scheduler::processor::{Processor, ProcessorId};
use crate::scheduler::queue::Queue;

/// Registry and busy-set, guarded together by the dispatcher lock.
#[derive(Default)]
struct DispatchState {
    next_id: ProcessorId,
    processors: HashMap<ProcessorId, Arc<dyn Processor>>,
    /// Processor ID -> job currently running on it. Absent means idle.
    processing: HashMap<ProcessorId, Uuid>,
}

struct Inner {
    config: DispatcherConfig,
    state: Mutex<DispatchState>,
    signal_tx: mpsc::Sender<()>,
    /// Taken by the assignment loop when it starts.
    signal_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
    quit: CancellationToken,
    /// The assignment loop; drained before `runs` so a pass in progress
    /// finishes spawning before the run tracker is awaited.
    assigner: TaskTracker,
    runs: TaskTracker,
}

/// Matches idle processors against pending jobs from a [`Queue`].
///
/// Registration and job completion push a content-free signal; a single
/// background loop turns each batch of pending signals into one assignment
/// pass over every idle processor. Each processor runs at most one job at a
/// time, and every finished run reports its outcome to the queue exactly
/// once.
///
/// The handle is cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("stopped", &self.inner.quit.is_cancelled())
            .field("in_flight", &self.inner.runs.len())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(config.signal_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(DispatchState::default()),
                signal_tx,
                signal_rx: std::sync::Mutex::new(Some(signal_rx)),
                quit: CancellationToken::new(),
                assigner: TaskTracker::new(),
                runs: TaskTracker::new(),
            }),
        }
    }

    /// Register a processor and request an assignment pass for it.
    ///
    /// IDs start at 1 and are never reused, even after unregistration.
    pub async fn register_processor(&self, processor: Arc<dyn Processor>) -> ProcessorId {
        let processor_id = {
            let mut state = self.inner.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.processors.insert(id, processor);
            id
        };

        tracing::info!(processor_id, "Processor registered");
        self.notify();
        processor_id
    }

    /// Remove a processor from the registry.
    ///
    /// A job already running on it is not cancelled: the run finishes,
    /// reports its outcome and frees the busy entry as usual. Returns false
    /// if the ID was not registered.
    pub async fn unregister_processor(&self, processor_id: ProcessorId) -> bool {
        let mut state = self.inner.state.lock().await;
        let removed = state.processors.remove(&processor_id).is_some();
        if removed {
            match state.processing.get(&processor_id) {
                Some(job_id) => tracing::info!(
                    processor_id,
                    job_id = %job_id,
                    "Processor unregistered while running a job"
                ),
                None => tracing::info!(processor_id, "Processor unregistered"),
            }
        }
        removed
    }

    /// Request an assignment pass, e.g. after new jobs were enqueued.
    ///
    /// Never blocks the caller. When the signal channel is full the send is
    /// parked on a spawned task until the loop drains a slot, so a sustained
    /// burst grows the number of parked tasks rather than losing signals.
    /// After `stop_loop` signals are discarded.
    pub fn notify(&self) {
        if self.inner.quit.is_cancelled() {
            return;
        }

        match self.inner.signal_tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                let tx = self.inner.signal_tx.clone();
                let quit = self.inner.quit.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = quit.cancelled() => {}
                        _ = tx.send(()) => {}
                    }
                });
            }
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Assignment loop gone, signal dropped");
            }
        }
    }

    /// Launch the background assignment loop.
    ///
    /// Fails with [`DispatchError::LoopAlreadyStarted`] on a second call.
    pub fn start_loop(&self, queue: Arc<dyn Queue>) -> Result<JoinHandle<()>> {
        let mut signal_rx = self
            .inner
            .signal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DispatchError::LoopAlreadyStarted)?;

        let dispatcher = self.clone();
        let quit = self.inner.quit.clone();

        tracing::info!(
            signal_capacity = self.inner.config.signal_capacity,
            "Assignment loop started"
        );

        Ok(self.inner.assigner.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = quit.cancelled() => break,

                    signal = signal_rx.recv() => {
                        if signal.is_none() {
                            break;
                        }
                        // Pending signals coalesce into this pass
                        while signal_rx.try_recv().is_ok() {}

                        if let Err(e) = dispatcher.assign_jobs(&queue).await {
                            tracing::error!(error = %e, "Cannot assign jobs");
                        }
                    }
                }
            }
            tracing::info!("Assignment loop stopped");
        }))
    }

    /// Stop the assignment loop. In-flight runs are not cancelled.
    ///
    /// Safe to call more than once.
    pub fn stop_loop(&self) {
        self.inner.quit.cancel();
    }

    /// Stop the loop and wait for every in-flight run to report.
    ///
    /// A pass already under way finishes first, including any runs it hands
    /// out, so those are awaited too.
    pub async fn shutdown(&self) {
        self.stop_loop();
        self.inner.assigner.close();
        self.inner.assigner.wait().await;

        self.inner.runs.close();
        self.inner.runs.wait().await;
    }

    /// Registered processor IDs in ascending order
    pub async fn processor_ids(&self) -> Vec<ProcessorId> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<ProcessorId> = state.processors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_registered(&self, processor_id: ProcessorId) -> bool {
        self.inner
            .state
            .lock()
            .await
            .processors
            .contains_key(&processor_id)
    }

    /// Job currently running on `processor_id`, registered or not
    pub async fn running_job(&self, processor_id: ProcessorId) -> Option<Uuid> {
        self.inner
            .state
            .lock()
            .await
            .processing
            .get(&processor_id)
            .copied()
    }

    /// Number of processor IDs with a job in flight
    pub async fn busy_count(&self) -> usize {
        self.inner.state.lock().await.processing.len()
    }

    /// Registered processors eligible for assignment, ascending
    pub async fn idle_processors(&self) -> Vec<ProcessorId> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<ProcessorId> = state
            .processors
            .keys()
            .filter(|id| !state.processing.contains_key(id))
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of run tasks that have not finished reporting yet
    pub fn in_flight(&self) -> usize {
        self.inner.runs.len()
    }

    /// One assignment pass over every idle processor.
    ///
    /// Holds the lock for the whole pass, so queue latency extends the
    /// critical section. Processors freed during the pass wait for the next
    /// signal.
    async fn assign_jobs(&self, queue: &Arc<dyn Queue>) -> Result<usize> {
        let mut state = self.inner.state.lock().await;

        let idle: Vec<ProcessorId> = state
            .processors
            .keys()
            .filter(|id| !state.processing.contains_key(id))
            .copied()
            .collect();

        let mut assigned = 0;
        for processor_id in idle {
            if self.assign_job(&mut state, queue, processor_id).await? {
                assigned += 1;
            }
        }

        if assigned > 0 {
            tracing::debug!(assigned, busy = state.processing.len(), "Assignment pass done");
        }
        Ok(assigned)
    }

    /// Hand one job to `processor_id` and spawn its run.
    ///
    /// Caller holds the lock. Returns false when the queue had nothing pending.
    async fn assign_job(
        &self,
        state: &mut DispatchState,
        queue: &Arc<dyn Queue>,
        processor_id: ProcessorId,
    ) -> Result<bool> {
        let processor = state
            .processors
            .get(&processor_id)
            .cloned()
            .ok_or(DispatchError::ProcessorNotFound(processor_id))?;

        let Some(job) = queue.dequeue_job().await? else {
            return Ok(false);
        };

        if let Some(running_job) = state.processing.get(&processor_id) {
            return Err(DispatchError::ProcessorBusy {
                processor_id,
                job_id: job.id,
                running_job: *running_job,
            });
        }

        tracing::info!(job_id = %job.id, processor_id, "Assigning job to processor");
        state.processing.insert(processor_id, job.id);

        let dispatcher = self.clone();
        let queue = queue.clone();
        self.inner.runs.spawn(async move {
            dispatcher
                .run_job(queue, processor_id, processor, job)
                .await;
        });

        Ok(true)
    }

    /// Run a job outside the lock, report its outcome and free the processor.
    async fn run_job(
        self,
        queue: Arc<dyn Queue>,
        processor_id: ProcessorId,
        processor: Arc<dyn Processor>,
        job: Job,
    ) {
        let job_id = job.id;

        // Run on its own task so a panicking processor still frees its slot
        let result = tokio::spawn(async move { processor.run(&job).await }).await;

        let outcome = match result {
            Ok(Ok(())) => JobOutcome::Complete,
            Ok(Err(e)) => {
                tracing::warn!(processor_id, job_id = %job_id, error = %e, "Job failed");
                JobOutcome::Failed
            }
            Err(e) => {
                tracing::error!(processor_id, job_id = %job_id, error = %e, "Processor panicked");
                JobOutcome::Failed
            }
        };

        match queue.mark_job_done(job_id, outcome).await {
            Ok(()) => tracing::info!(processor_id, job_id = %job_id, outcome = %outcome, "Job done"),
            Err(e) => tracing::error!(
                job_id = %job_id,
                outcome = %outcome,
                error = %e,
                "Failed to report job outcome"
            ),
        }

        self.processor_done(processor_id).await;
    }

    async fn processor_done(&self, processor_id: ProcessorId) {
        self.inner
            .state
            .lock()
            .await
            .processing
            .remove(&processor_id);

        self.notify();
    }
}
