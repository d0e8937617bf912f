// Synchronous backend: no worker fleet, jobs run inline at enqueue time.
// Always available; the default when nothing else is configured.

use super::executor::JobExecutor;
use crate::domain::{Job, QueueName, WorkerNumber};
use crate::error::Result;
use crate::port::Backend;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub const SYNCHRONOUS_BACKEND: &str = "synchronous";

pub struct SynchronousBackend {
    executor: JobExecutor,
}

impl SynchronousBackend {
    pub fn new(executor: JobExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Backend for SynchronousBackend {
    fn name(&self) -> &str {
        SYNCHRONOUS_BACKEND
    }

    /// Runs the job before returning. A failing job is logged, exactly as a
    /// worker would, and does not fail the enqueue.
    async fn enqueue(&self, job: &Job, queue: &QueueName) -> Result<()> {
        if let Err(e) = self.executor.execute(job).await {
            warn!(task = %job.task, queue = %queue, error = %e, "Synchronous job failed");
        }
        Ok(())
    }

    /// Nothing is ever queued; waits out the timeout so idle workers do not spin
    async fn dequeue(
        &self,
        _queue: &QueueName,
        _worker_number: WorkerNumber,
        timeout: Duration,
    ) -> Result<Option<Job>> {
        sleep(timeout).await;
        Ok(None)
    }

    async fn length(&self, _queue: &QueueName) -> Result<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::middleware::MiddlewareChain;
    use crate::application::tasks::TaskRegistry;
    use crate::error::AppError;
    use crate::port::{deduplicate_queue, FnTask, NullProgressLogger};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn setup() -> (SynchronousBackend, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut tasks = TaskRegistry::new();
        tasks
            .register(
                "send",
                QueueName::new("emails").unwrap(),
                FnTask::new(move |job: Job| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if job.args.is_empty() {
                            Ok(())
                        } else {
                            Err(AppError::task("rejected"))
                        }
                    }
                }),
            )
            .unwrap();
        let executor = JobExecutor::new(Arc::new(tasks), MiddlewareChain::empty());
        (SynchronousBackend::new(executor), calls)
    }

    #[tokio::test]
    async fn test_enqueue_runs_inline_and_dequeue_is_empty() {
        let (backend, calls) = setup();
        let queue = QueueName::new("emails").unwrap();

        backend
            .enqueue(&Job::new_test("send", "emails"), &queue)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let started = tokio::time::Instant::now();
        let job = backend
            .dequeue(&queue, 1, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(job.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(backend.length(&queue).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_job_does_not_fail_enqueue() {
        let (backend, calls) = setup();
        let queue = QueueName::new("emails").unwrap();
        let job = Job::new_test("send", "emails").with_args(vec![serde_json::json!(1)]);

        assert!(backend.enqueue(&job, &queue).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_deduplicate_capability() {
        let (backend, calls) = setup();
        let queue = QueueName::new("emails").unwrap();
        let result = deduplicate_queue(&backend, &queue, &NullProgressLogger).await;
        assert!(matches!(result, Err(AppError::Unsupported(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
