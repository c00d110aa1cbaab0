//! Units of work and the processors that run them.
//!
//! A [`Processor`] accepts a job and guarantees it runs exactly once. The
//! typed entry point is `enqueue` on `dyn Processor`, which pairs the job
//! with a [`Future`] for its result.
//!
//! # Configuration
//!
//! ```rust
//! use std::sync::Arc;
//! use accel_core::{Processor, ProcessorConfig, SyncProcessor, ThreadPoolProcessor};
//!
//! let inline: Arc<dyn Processor> = Arc::new(SyncProcessor);
//! assert!(inline.enqueue(|| 2 + 2).is_resolved());
//!
//! let pool = ThreadPoolProcessor::new(ProcessorConfig { threads: 2, ..Default::default() })?;
//! let pool: Arc<dyn Processor> = Arc::new(pool);
//! assert_eq!(pool.enqueue(|| 40 + 2).wait(), 42);
//! # Ok::<(), accel_core::Error>(())
//! ```

use tracing::trace;

use crate::future::Future;
use crate::{Error, Result};

/// Type-erased unit of work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes enqueued work.
pub trait Processor: Send + Sync {
    /// Runs `job` now or later, exactly once.
    fn execute(&self, job: Job);

    /// Processor name, used in logs.
    fn name(&self) -> &'static str;
}

impl dyn Processor {
    /// Enqueues `work` and returns a future for its result.
    pub fn enqueue<T, F>(&self, work: F) -> Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (promise, future) = Future::pending();
        trace!(processor = self.name(), "enqueue");
        self.execute(Box::new(move || promise.resolve(work())));
        future
    }
}

/// Runs every job inline on the calling thread, so every future it hands
/// out is already resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncProcessor;

impl Processor for SyncProcessor {
    fn execute(&self, job: Job) {
        job();
    }

    fn name(&self) -> &'static str {
        "sync"
    }
}

/// Thread pool configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Worker count (0 = one per logical CPU).
    pub threads: usize,
    /// Worker thread name prefix.
    pub thread_name: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            thread_name: "accel-worker".to_string(),
        }
    }
}

/// Runs jobs on a dedicated rayon thread pool.
pub struct ThreadPoolProcessor {
    pool: rayon::ThreadPool,
}

impl ThreadPoolProcessor {
    /// Starts the pool.
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let prefix = config.thread_name;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Processor for ThreadPoolProcessor {
    fn execute(&self, job: Job) {
        self.pool.spawn(job);
    }

    fn name(&self) -> &'static str {
        "thread-pool"
    }
}

impl std::fmt::Debug for ThreadPoolProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolProcessor")
            .field("threads", &self.threads())
            .finish()
    }
}
