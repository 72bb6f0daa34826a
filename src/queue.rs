//! FIFO retry queue with bounded per-unit attempts.
//!
//! All state (pending units, terminal failures, counters) lives behind one
//! mutex owned by the queue, so any number of workers can drain the same
//! instance. A unit is popped from the head before its processing function
//! runs and is handed to exactly one worker.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::{Mutex, broadcast};

use crate::retry::IsRetryable;
use crate::types::{QueueEvent, QueueStats, WorkUnit};

/// Attempts a unit gets before it is classified as terminally failed
pub const DEFAULT_RETRY_BOUND: u32 = 20;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkUnit>,
    failed: Vec<WorkUnit>,
    in_flight: usize,
    completed: usize,
}

/// How one run of a processing function ended
enum Outcome {
    Success,
    Failure { error: String, retryable: bool },
}

/// FIFO work queue with round-robin retry and a terminal-failure collection
///
/// A failed unit goes back to the tail, behind everything enqueued after it,
/// until its attempt counter exceeds the retry bound. Processing errors never
/// escape [`process`](RetryQueue::process); callers observe only the final
/// pending size and the failure collection.
pub struct RetryQueue {
    state: Mutex<QueueState>,
    retry_bound: u32,
    event_tx: broadcast::Sender<QueueEvent>,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryQueue {
    /// Create a queue with the default retry bound (20)
    pub fn new() -> Self {
        Self::with_retry_bound(DEFAULT_RETRY_BOUND)
    }

    /// Create a queue with a custom retry bound
    pub fn with_retry_bound(retry_bound: u32) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(QueueState::default()),
            retry_bound,
            event_tx,
        }
    }

    /// The configured retry bound
    pub fn retry_bound(&self) -> u32 {
        self.retry_bound
    }

    /// Subscribe to queue events
    ///
    /// Receivers that fall more than the channel capacity behind miss events
    /// (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    /// Append a unit to the tail
    pub async fn enqueue(&self, unit: WorkUnit) {
        let mut state = self.state.lock().await;
        state.pending.push_back(unit);
    }

    /// Append several units in order
    pub async fn enqueue_all(&self, units: impl IntoIterator<Item = WorkUnit>) {
        let mut state = self.state.lock().await;
        state.pending.extend(units);
    }

    /// Number of pending units (terminal failures excluded)
    pub async fn size(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// True when no unit is pending
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    /// Copy of the terminal-failure collection
    pub async fn failed(&self) -> Vec<WorkUnit> {
        self.state.lock().await.failed.clone()
    }

    /// Remove and return the terminal-failure collection
    pub async fn take_failed(&self) -> Vec<WorkUnit> {
        std::mem::take(&mut self.state.lock().await.failed)
    }

    /// Snapshot of the queue counters
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight,
            completed: state.completed,
            failed: state.failed.len(),
        }
    }

    /// Drain the queue, applying `f` to every unit
    ///
    /// Returns when the pending sequence is empty at the moment this drainer
    /// looks at it. Several drainers may run concurrently on one queue; each
    /// re-checks after settling its own unit, so a unit re-enqueued by the
    /// last busy drainer is always picked up again.
    ///
    /// A panic inside `f` counts as a retryable failure of that unit.
    ///
    /// Returns the number of processing-function runs this drainer performed.
    pub async fn process<F, Fut, E>(&self, f: F) -> usize
    where
        F: Fn(WorkUnit) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: IsRetryable + Display,
    {
        let mut runs = 0;

        while let Some(unit) = self.next().await {
            runs += 1;

            tracing::info!(
                description = unit.description(),
                attempt = unit.attempts(),
                "Processing unit"
            );
            let _ = self.event_tx.send(QueueEvent::Started {
                description: unit.description().to_string(),
                attempt: unit.attempts(),
            });

            let outcome = match AssertUnwindSafe(f(unit.clone())).catch_unwind().await {
                Ok(Ok(())) => Outcome::Success,
                Ok(Err(e)) => Outcome::Failure {
                    error: e.to_string(),
                    retryable: e.is_retryable(),
                },
                Err(_) => Outcome::Failure {
                    error: "processing function panicked".to_string(),
                    retryable: true,
                },
            };

            self.settle(unit, outcome).await;
        }

        runs
    }

    /// Pop the head and mark it in flight
    async fn next(&self) -> Option<WorkUnit> {
        let mut state = self.state.lock().await;
        let unit = state.pending.pop_front()?;
        state.in_flight += 1;
        Some(unit)
    }

    /// Record the outcome of one run
    async fn settle(&self, mut unit: WorkUnit, outcome: Outcome) {
        let event = {
            let mut state = self.state.lock().await;
            state.in_flight = state.in_flight.saturating_sub(1);

            match outcome {
                Outcome::Success => {
                    unit.mark_complete();
                    state.completed += 1;
                    tracing::debug!(
                        description = unit.description(),
                        attempts = unit.attempts(),
                        "Unit complete"
                    );
                    QueueEvent::Completed { unit }
                }
                Outcome::Failure { error, retryable } => {
                    unit.record_failure();
                    let attempts = unit.attempts();
                    let description = unit.description().to_string();

                    if retryable && attempts <= self.retry_bound {
                        tracing::warn!(
                            description = %description,
                            attempts,
                            retry_bound = self.retry_bound,
                            error = %error,
                            "Unit failed, retrying later"
                        );
                        state.pending.push_back(unit);
                        QueueEvent::Requeued {
                            description,
                            attempts,
                            error,
                        }
                    } else {
                        tracing::error!(
                            description = %description,
                            attempts,
                            retryable,
                            error = %error,
                            "Unit failed permanently"
                        );
                        state.failed.push(unit);
                        QueueEvent::Failed {
                            description,
                            attempts,
                            error,
                        }
                    }
                }
            }
        };

        let _ = self.event_tx.send(event);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient error"),
                TestError::Fatal => write!(f, "fatal error"),
            }
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn unit(name: &str) -> WorkUnit {
        WorkUnit::fetch(format!("https://example.org/{name}"), format!("{name}.html"), name)
    }

    /// Records every (description, attempt) the processing function sees
    #[derive(Clone, Default)]
    struct CallLog(Arc<StdMutex<Vec<(String, u32)>>>);

    impl CallLog {
        fn push(&self, unit: &WorkUnit) {
            self.0
                .lock()
                .unwrap()
                .push((unit.description().to_string(), unit.attempts()));
        }

        fn calls(&self) -> Vec<(String, u32)> {
            self.0.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_success_discards_unit() {
        let queue = RetryQueue::new();
        queue.enqueue(unit("a")).await;
        queue.enqueue(unit("b")).await;
        assert_eq!(queue.size().await, 2);

        let runs = queue
            .process(|_unit| async { Ok::<(), TestError>(()) })
            .await;

        assert_eq!(runs, 2);
        assert!(queue.is_empty().await);
        assert!(queue.failed().await.is_empty());
        let stats = queue.stats().await;
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_always_failing_unit_is_retried_exactly_retry_bound_times() {
        let queue = RetryQueue::with_retry_bound(5);
        queue.enqueue(unit("doomed")).await;
        let log = CallLog::default();

        let log_clone = log.clone();
        queue
            .process(move |unit| {
                let log = log_clone.clone();
                async move {
                    log.push(&unit);
                    Err::<(), _>(TestError::Transient)
                }
            })
            .await;

        // First run plus retry_bound - 1 retries; the run that pushes the
        // counter past the bound moves the unit to the failure collection.
        let attempts: Vec<u32> = log.calls().into_iter().map(|(_, a)| a).collect();
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);

        assert_eq!(queue.size().await, 0);
        let failed = queue.failed().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts(), 6);
        assert!(!failed[0].is_complete());
    }

    #[tokio::test]
    async fn test_default_bound_fails_after_twenty_runs() {
        let queue = RetryQueue::new();
        queue.enqueue(unit("doomed")).await;

        let runs = queue
            .process(|_unit| async { Err::<(), _>(TestError::Transient) })
            .await;

        assert_eq!(runs, 20);
        assert_eq!(queue.failed().await[0].attempts(), DEFAULT_RETRY_BOUND + 1);
    }

    #[tokio::test]
    async fn test_eventual_success_is_never_reported_failed() {
        let queue = RetryQueue::with_retry_bound(5);
        queue.enqueue(unit("flaky")).await;
        let mut events = queue.subscribe();

        let failures = Arc::new(StdMutex::new(0u32));
        let failures_clone = failures.clone();
        queue
            .process(move |_unit| {
                let failures = failures_clone.clone();
                async move {
                    let mut count = failures.lock().unwrap();
                    if *count < 3 {
                        *count += 1;
                        Err(TestError::Transient)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(queue.failed().await.is_empty());
        assert!(queue.is_empty().await);

        let mut completed = None;
        while let Ok(event) = events.try_recv() {
            if let QueueEvent::Completed { unit } = event {
                completed = Some(unit);
            }
        }
        let completed = completed.expect("completion event");
        assert!(completed.is_complete());
        assert_eq!(completed.attempts(), 4);
    }

    #[tokio::test]
    async fn test_failed_unit_retries_behind_later_units() {
        let queue = RetryQueue::new();
        queue.enqueue(unit("a")).await;
        queue.enqueue(unit("b")).await;
        let log = CallLog::default();

        let log_clone = log.clone();
        queue
            .process(move |unit| {
                let log = log_clone.clone();
                async move {
                    log.push(&unit);
                    if unit.description() == "a" && unit.attempts() == 1 {
                        Err(TestError::Transient)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(
            log.calls(),
            vec![("a".to_string(), 1), ("b".to_string(), 1), ("a".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_round_robin_interleaves_multiple_failures() {
        let queue = RetryQueue::with_retry_bound(2);
        for name in ["a", "b", "c"] {
            queue.enqueue(unit(name)).await;
        }
        let log = CallLog::default();

        let log_clone = log.clone();
        queue
            .process(move |unit| {
                let log = log_clone.clone();
                async move {
                    log.push(&unit);
                    if unit.description() == "b" {
                        Ok(())
                    } else {
                        Err(TestError::Transient)
                    }
                }
            })
            .await;

        let order: Vec<String> = log.calls().into_iter().map(|(d, _)| d).collect();
        assert_eq!(order, vec!["a", "b", "c", "a", "c"]);

        let mut failed: Vec<String> = queue
            .failed()
            .await
            .iter()
            .map(|u| u.description().to_string())
            .collect();
        failed.sort();
        assert_eq!(failed, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let queue = RetryQueue::new();
        queue.enqueue(unit("misconfigured")).await;

        let runs = queue
            .process(|_unit| async { Err::<(), _>(TestError::Fatal) })
            .await;

        assert_eq!(runs, 1);
        let failed = queue.failed().await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts(), 2);
    }

    #[tokio::test]
    async fn test_panic_counts_as_failure() {
        let queue = RetryQueue::with_retry_bound(3);
        queue.enqueue(unit("explodes")).await;

        let runs = queue
            .process(|unit| async move {
                if unit.attempts() < 3 {
                    panic!("boom");
                }
                Ok::<(), TestError>(())
            })
            .await;

        assert_eq!(runs, 3);
        assert!(queue.failed().await.is_empty());
        assert_eq!(queue.stats().await.completed, 1);
        assert_eq!(queue.stats().await.in_flight, 0);
    }

    #[tokio::test]
    async fn test_every_unit_ends_completed_or_failed() {
        let queue = RetryQueue::with_retry_bound(3);
        for i in 0..20 {
            queue.enqueue(unit(&format!("u{i}"))).await;
        }

        // Even-numbered units always fail, odd ones succeed
        queue
            .process(|unit| async move {
                let n: u32 = unit.description()[1..].parse().unwrap();
                if n % 2 == 0 {
                    Err(TestError::Transient)
                } else {
                    Ok(())
                }
            })
            .await;

        let stats = queue.stats().await;
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.failed, 10);

        let mut seen: HashMap<String, u32> = HashMap::new();
        for unit in queue.failed().await {
            *seen.entry(unit.description().to_string()).or_default() += 1;
        }
        assert!(seen.values().all(|&count| count == 1));
    }

    #[tokio::test]
    async fn test_events_follow_unit_lifecycle() {
        let queue = RetryQueue::with_retry_bound(1);
        queue.enqueue(unit("once")).await;
        let mut events = queue.subscribe();

        queue
            .process(|_unit| async { Err::<(), _>(TestError::Transient) })
            .await;

        match events.recv().await.unwrap() {
            QueueEvent::Started {
                description,
                attempt,
            } => {
                assert_eq!(description, "once");
                assert_eq!(attempt, 1);
            }
            other => panic!("expected Started, got {other:?}"),
        }
        match events.recv().await.unwrap() {
            QueueEvent::Failed {
                attempts, error, ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(error, "transient error");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_take_failed_empties_collection() {
        let queue = RetryQueue::with_retry_bound(1);
        queue.enqueue(unit("x")).await;
        queue
            .process(|_unit| async { Err::<(), _>(TestError::Transient) })
            .await;

        assert_eq!(queue.take_failed().await.len(), 1);
        assert!(queue.failed().await.is_empty());
    }

    #[tokio::test]
    async fn test_process_on_empty_queue_returns_immediately() {
        let queue = RetryQueue::new();
        let runs = queue
            .process(|_unit| async { Ok::<(), TestError>(()) })
            .await;
        assert_eq!(runs, 0);
    }
}
