//! Worker pool that drains one [`RetryQueue`] concurrently

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::QueueConfig;
use crate::queue::RetryQueue;
use crate::retry::IsRetryable;
use crate::types::{QueueStats, WorkUnit};

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 8;

/// Fixed-size pool of workers sharing one queue
///
/// Every worker runs [`RetryQueue::process`] with the same processing
/// function. The pool has no deadline: `run` returns once every worker has
/// observed an empty queue.
#[derive(Clone, Debug)]
pub struct Executor {
    workers: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl Executor {
    /// Create a pool with the given worker count (at least one)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Create a pool sized from the queue configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.workers)
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drain `queue` with `f` on every worker and wait for all of them
    ///
    /// Returns the queue counters after the last worker finished. A worker
    /// task that dies is logged; the remaining workers keep draining.
    pub async fn run<F, Fut, E>(&self, queue: Arc<RetryQueue>, f: F) -> QueueStats
    where
        F: Fn(WorkUnit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: IsRetryable + Display + Send + 'static,
    {
        let f = Arc::new(f);
        let mut workers = JoinSet::new();

        let initial = queue.size().await;
        tracing::info!(workers = self.workers, pending = initial, "Starting workers");

        for id in 0..self.workers {
            let queue = queue.clone();
            let f = f.clone();
            workers.spawn(
                async move {
                    let runs = queue.process(|unit| f(unit)).await;
                    tracing::debug!(runs, "Worker observed empty queue");
                    runs
                }
                .instrument(tracing::info_span!("worker", id)),
            );
        }

        let mut total_runs = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(runs) => total_runs += runs,
                Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            }
        }

        let stats = queue.stats().await;
        tracing::info!(
            runs = total_runs,
            completed = stats.completed,
            failed = stats.failed,
            pending = stats.pending,
            "All workers finished"
        );
        stats
    }
}
