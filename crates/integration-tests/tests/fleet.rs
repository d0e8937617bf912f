//! Two machines, one shared SQLite queue: every job runs exactly once.

use lightq_core::application::{
    owned_workers, shutdown_channel, BackendRegistry, BackendSelection, Backends, EnqueueRequest,
    JobExecutor, MiddlewareContext, MiddlewareRegistry, Producer, QueueRegistry, TaskRegistry,
    Worker, WorkerStats,
};
use lightq_core::domain::{Job, MachineShard, QueueName};
use lightq_core::port::time_provider::SystemTimeProvider;
use lightq_core::port::{Backend, FnTask, TransactionManager};
use lightq_core::AppError;
use lightq_infra_sqlite::{SqliteBackend, SqliteTransactionManager, SQLITE_BACKEND};
use lightq_integration_tests::TempDatabase;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Runs = Arc<Mutex<Vec<(String, i64)>>>;

fn queue(name: &str) -> QueueName {
    QueueName::new(name).unwrap()
}

/// Task registry whose "record" task notes (queue, n) and fails for multiples of 7
fn tasks(runs: Runs) -> Arc<TaskRegistry> {
    let mut tasks = TaskRegistry::new();
    tasks
        .register(
            "record",
            queue("emails"),
            FnTask::new(move |job: Job| {
                let runs = runs.clone();
                async move {
                    let n = job.args[0].as_i64().unwrap_or_default();
                    runs.lock().unwrap().push((job.queue.to_string(), n));
                    if n % 7 == 0 {
                        return Err(AppError::task("multiple of seven"));
                    }
                    Ok::<(), AppError>(())
                }
            }),
        )
        .unwrap();
    Arc::new(tasks)
}

async fn sqlite_backends(db: &TempDatabase) -> Arc<Backends> {
    let backend = SqliteBackend::connect(db.path())
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    let mut registry = BackendRegistry::new();
    registry.register_instance(SQLITE_BACKEND, Arc::new(backend));
    Arc::new(Backends::new(registry, BackendSelection::new(SQLITE_BACKEND)).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_machines_process_every_job_once() {
    let db = TempDatabase::new();
    let runs: Runs = Arc::default();
    let tasks = tasks(runs.clone());

    let mut registry =
        QueueRegistry::from_counts([(queue("emails"), 3), (queue("reports"), 2)]).unwrap();
    tasks.contribute_implied_queues(&mut registry).unwrap();
    let counts = registry.queue_counts();

    // Produce
    let producer = Producer::new(
        tasks.clone(),
        sqlite_backends(&db).await,
        Arc::new(SystemTimeProvider),
    );
    for n in 0..60 {
        let mut request = EnqueueRequest::new("record");
        request.args = vec![json!(n)];
        if n % 2 == 1 {
            request.queue = Some(queue("reports"));
        }
        producer.enqueue(request).await.unwrap();
    }

    // Each machine opens its own connections, as separate hosts would
    let (sender, token) = shutdown_channel();
    let mut handles = Vec::new();
    for machine in 1..=2 {
        let backends = sqlite_backends(&db).await;
        let transactions: Arc<dyn TransactionManager> =
            Arc::new(SqliteTransactionManager::lazy(db.path()));
        let chain = MiddlewareRegistry::with_builtins()
            .build(
                &["logging", "transaction"],
                &MiddlewareContext {
                    transactions: Some(transactions),
                },
            )
            .unwrap();
        assert_eq!(chain.len(), 2);
        let executor = JobExecutor::new(tasks.clone(), chain);

        for worker in owned_workers(&counts, MachineShard::new(machine, 2).unwrap()) {
            let backend = backends.for_queue(&worker.queue).await.unwrap();
            let runner = Worker::new(worker, backend, executor.clone())
                .with_dequeue_timeout(Duration::from_millis(100));
            let token = token.clone();
            handles.push(tokio::spawn(async move { runner.run(token).await }));
        }
    }
    assert_eq!(handles.len(), 5);

    let check = sqlite_backends(&db).await;
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let mut waiting = 0;
            for name in ["emails", "reports"] {
                let backend = check.for_queue(&queue(name)).await.unwrap();
                waiting += backend.length(&queue(name)).await.unwrap();
            }
            if waiting == 0 && runs.lock().unwrap().len() >= 60 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("fleet drains the queues");

    sender.shutdown();
    let mut total = WorkerStats::default();
    for handle in handles {
        let stats = handle.await.unwrap().unwrap();
        total.processed += stats.processed;
        total.failed += stats.failed;
    }

    let runs = runs.lock().unwrap().clone();
    let mut seen: HashMap<i64, usize> = HashMap::new();
    for (queue_name, n) in &runs {
        let expected = if n % 2 == 1 { "reports" } else { "emails" };
        assert_eq!(queue_name, expected);
        *seen.entry(*n).or_default() += 1;
    }
    assert_eq!(seen.len(), 60);
    assert!(seen.values().all(|count| *count == 1), "a job ran twice");

    // Failures (0, 7, 14, ... 56) are logged and dropped, not retried
    assert_eq!(total.processed, 60);
    assert_eq!(total.failed, 9);
}
