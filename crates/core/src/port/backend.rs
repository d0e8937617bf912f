// Backend Port (Interface)
// Storage/transport for jobs. Everything crossing a process or machine boundary goes through here.

use crate::domain::{Job, QueueName, WorkerNumber};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Backend interface.
///
/// Implementations:
/// - SynchronousBackend: runs jobs inline at enqueue time (core)
/// - SqliteBackend: shared database file, usable by a whole fleet (infra-sqlite)
/// - InMemoryBackend: single-process double for tests
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &str;

    /// One-time initialization in each worker process.
    /// An error here is fatal to that worker's startup.
    async fn startup(&self, _queue: &QueueName) -> Result<()> {
        Ok(())
    }

    /// Store a job for later delivery on `queue`
    async fn enqueue(&self, job: &Job, queue: &QueueName) -> Result<()>;

    /// Wait up to `timeout` for a job on `queue`.
    ///
    /// Returns `Ok(None)` when the timeout elapses. Concurrent callers on the
    /// same queue never receive the same job.
    async fn dequeue(
        &self,
        queue: &QueueName,
        worker_number: WorkerNumber,
        timeout: Duration,
    ) -> Result<Option<Job>>;

    /// Current backlog size (observability only)
    async fn length(&self, queue: &QueueName) -> Result<u64>;

    /// Acknowledge that `worker_number` finished its attempt at `job`
    async fn processed_job(
        &self,
        _queue: &QueueName,
        _worker_number: WorkerNumber,
        _job: &Job,
    ) -> Result<()> {
        Ok(())
    }

    /// Deduplication capability, if this backend has it
    fn as_deduplicate(&self) -> Option<&dyn Deduplicate> {
        None
    }
}

/// Counts reported by a deduplication pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeduplicateOutcome {
    pub scanned: u64,
    pub removed: u64,
}

/// Optional backend capability: remove redundant queued jobs.
/// Equality is backend-defined; the provided backends compare [`Job::identity`].
#[async_trait]
pub trait Deduplicate: Send + Sync {
    async fn deduplicate(
        &self,
        queue: &QueueName,
        progress: &dyn ProgressLogger,
    ) -> Result<DeduplicateOutcome>;
}

/// Progress sink for long-running maintenance scans
pub trait ProgressLogger: Send + Sync {
    fn info(&self, message: &str);

    fn progress(&self, done: u64, total: u64);
}

/// Discards all progress
pub struct NullProgressLogger;

impl ProgressLogger for NullProgressLogger {
    fn info(&self, _message: &str) {}

    fn progress(&self, _done: u64, _total: u64) {}
}

/// Run deduplication on `queue`, checking the capability before anything is scanned.
///
/// # Errors
/// - `AppError::Unsupported` if the backend does not offer deduplication
pub async fn deduplicate_queue(
    backend: &dyn Backend,
    queue: &QueueName,
    progress: &dyn ProgressLogger,
) -> Result<DeduplicateOutcome> {
    let dedup = backend.as_deduplicate().ok_or_else(|| {
        AppError::Unsupported(format!(
            "backend '{}' (queue '{}') does not support deduplication",
            backend.name(),
            queue
        ))
    })?;
    dedup.deduplicate(queue, progress).await
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::sync::Notify;
    use tokio::time::Instant;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// FIFO queues in process memory.
    ///
    /// Blocked dequeuers are woken by enqueue, so tests do not depend on polling.
    pub struct InMemoryBackend {
        queues: Mutex<HashMap<QueueName, VecDeque<Job>>>,
        processed: Mutex<Vec<(QueueName, WorkerNumber, Job)>>,
        notify: Notify,
        dequeue_calls: AtomicUsize,
        startup_failure: Option<String>,
        deduplicate: bool,
    }

    impl Default for InMemoryBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryBackend {
        pub fn new() -> Self {
            Self {
                queues: Mutex::new(HashMap::new()),
                processed: Mutex::new(Vec::new()),
                notify: Notify::new(),
                dequeue_calls: AtomicUsize::new(0),
                startup_failure: None,
                deduplicate: true,
            }
        }

        /// Same backend without the deduplication capability
        pub fn without_deduplicate() -> Self {
            Self {
                deduplicate: false,
                ..Self::new()
            }
        }

        /// Backend whose `startup` always fails
        pub fn failing_startup(message: impl Into<String>) -> Self {
            Self {
                startup_failure: Some(message.into()),
                ..Self::new()
            }
        }

        /// Acknowledged jobs in acknowledgement order
        pub fn processed(&self) -> Vec<(QueueName, WorkerNumber, Job)> {
            lock(&self.processed).clone()
        }

        pub fn dequeue_calls(&self) -> usize {
            self.dequeue_calls.load(Ordering::SeqCst)
        }

        fn pop(&self, queue: &QueueName) -> Option<Job> {
            lock(&self.queues).get_mut(queue).and_then(VecDeque::pop_front)
        }
    }

    #[async_trait]
    impl Backend for InMemoryBackend {
        fn name(&self) -> &str {
            "memory"
        }

        async fn startup(&self, queue: &QueueName) -> Result<()> {
            match &self.startup_failure {
                Some(message) => Err(AppError::Backend(format!(
                    "startup failed for queue '{}': {}",
                    queue, message
                ))),
                None => Ok(()),
            }
        }

        async fn enqueue(&self, job: &Job, queue: &QueueName) -> Result<()> {
            lock(&self.queues)
                .entry(queue.clone())
                .or_default()
                .push_back(job.clone());
            self.notify.notify_waiters();
            Ok(())
        }

        async fn dequeue(
            &self,
            queue: &QueueName,
            _worker_number: WorkerNumber,
            timeout: Duration,
        ) -> Result<Option<Job>> {
            self.dequeue_calls.fetch_add(1, Ordering::SeqCst);
            let deadline = Instant::now() + timeout;

            loop {
                // Register interest before checking, so an enqueue in between is not missed
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(job) = self.pop(queue) {
                    return Ok(Some(job));
                }

                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return Ok(self.pop(queue));
                }
            }
        }

        async fn length(&self, queue: &QueueName) -> Result<u64> {
            Ok(lock(&self.queues)
                .get(queue)
                .map(|q| q.len() as u64)
                .unwrap_or(0))
        }

        async fn processed_job(
            &self,
            queue: &QueueName,
            worker_number: WorkerNumber,
            job: &Job,
        ) -> Result<()> {
            lock(&self.processed).push((queue.clone(), worker_number, job.clone()));
            Ok(())
        }

        fn as_deduplicate(&self) -> Option<&dyn Deduplicate> {
            if self.deduplicate {
                Some(self)
            } else {
                None
            }
        }
    }

    #[async_trait]
    impl Deduplicate for InMemoryBackend {
        async fn deduplicate(
            &self,
            queue: &QueueName,
            progress: &dyn ProgressLogger,
        ) -> Result<DeduplicateOutcome> {
            let mut queues = lock(&self.queues);
            let Some(jobs) = queues.get_mut(queue) else {
                return Ok(DeduplicateOutcome::default());
            };

            let total = jobs.len() as u64;
            progress.info(&format!("Scanning {} jobs on queue '{}'", total, queue));

            let mut seen = HashSet::new();
            let mut kept = VecDeque::with_capacity(jobs.len());
            for (index, job) in jobs.drain(..).enumerate() {
                if seen.insert(job.identity()) {
                    kept.push_back(job);
                }
                progress.progress(index as u64 + 1, total);
            }

            let removed = total - kept.len() as u64;
            *jobs = kept;
            Ok(DeduplicateOutcome {
                scanned: total,
                removed,
            })
        }
    }
}
