const DEFAULT_SIGNAL_CAPACITY: usize = 100;
const DEFAULT_MAX_JOBS: usize = 10_000;

/// Configuration for the dispatcher's assignment loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Slots in the re-check signal channel. Signals beyond this are parked
    /// on spawned tasks until the loop catches up.
    pub signal_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            signal_capacity: DEFAULT_SIGNAL_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    pub fn with_signal_capacity(mut self, signal_capacity: usize) -> Self {
        self.signal_capacity = signal_capacity;
        self
    }
}

/// Configuration for the in-memory job queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs held, in any status
    pub max_jobs: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
        }
    }
}

impl QueueConfig {
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }
}
