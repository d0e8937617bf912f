//! Composition root: settings -> registries -> executor and backends
//!
//! Built identically by the supervisor and by every worker process; children
//! re-read the configuration instead of inheriting state.

use crate::settings::Settings;
use anyhow::Result;
use lightq_core::application::{
    BackendRegistry, Backends, JobExecutor, MiddlewareContext, MiddlewareRegistry, Producer,
    QueueCounts, QueueRegistry, SynchronousBackend, TaskRegistry, SYNCHRONOUS_BACKEND,
};
use lightq_core::port::time_provider::SystemTimeProvider;
use lightq_core::port::{Backend, NoopTask, TransactionManager};
use lightq_infra_sqlite::{SqliteBackend, SqliteTransactionManager, SQLITE_BACKEND};
use lightq_infra_system::{CommandTask, COMMAND_TASK};
use std::sync::Arc;
use tracing::{debug, warn};

pub const NOOP_TASK: &str = "noop";

pub struct App {
    pub settings: Settings,
    pub tasks: Arc<TaskRegistry>,
    /// Frozen worker counts, implied queues included
    pub counts: QueueCounts,
    pub backends: Arc<Backends>,
    pub executor: JobExecutor,
}

impl App {
    /// Build everything a process needs, failing on any configuration error
    pub fn bootstrap(settings: Settings) -> Result<Self> {
        let tasks = Arc::new(builtin_tasks(&settings)?);

        let mut queues = QueueRegistry::from_counts(settings.worker_counts()?)?;
        tasks.contribute_implied_queues(&mut queues)?;
        let counts = queues.queue_counts();

        let transactions = settings.sqlite.as_ref().map(|sqlite| {
            Arc::new(SqliteTransactionManager::lazy(sqlite.path())) as Arc<dyn TransactionManager>
        });
        let chain = MiddlewareRegistry::with_builtins()
            .build(&settings.middleware, &MiddlewareContext { transactions })?;
        let executor = JobExecutor::new(tasks.clone(), chain);

        let mut registry = BackendRegistry::new();
        registry.register_instance(
            SYNCHRONOUS_BACKEND,
            Arc::new(SynchronousBackend::new(executor.clone())),
        );
        if let Some(sqlite) = &settings.sqlite {
            let path = sqlite.path();
            let max_deliveries = sqlite.max_deliveries;
            registry.register(SQLITE_BACKEND, move || {
                let path = path.clone();
                Box::pin(async move {
                    let backend = SqliteBackend::connect(&path)
                        .await?
                        .with_max_deliveries(max_deliveries);
                    Ok(Arc::new(backend) as Arc<dyn Backend>)
                })
            });
        }

        let selection = settings.backend_selection()?;
        for queue in selection.overrides.keys() {
            if !counts.contains(queue) {
                warn!(queue = %queue, "Backend override for a queue without workers");
            }
        }
        let backends = Arc::new(Backends::new(registry, selection)?);
        debug!(queues = counts.len(), workers = counts.total_workers(), "Application ready");

        Ok(Self {
            settings,
            tasks,
            counts,
            backends,
            executor,
        })
    }

    pub fn producer(&self) -> Producer {
        Producer::new(
            self.tasks.clone(),
            self.backends.clone(),
            Arc::new(SystemTimeProvider),
        )
    }
}

fn builtin_tasks(settings: &Settings) -> Result<TaskRegistry> {
    let queue = settings.command_queue()?;
    let mut tasks = TaskRegistry::new();
    tasks
        .register(NOOP_TASK, queue.clone(), NoopTask)?
        .register(
            COMMAND_TASK,
            queue,
            CommandTask::new(settings.command.env_allowlist.clone()),
        )?;
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightq_core::domain::QueueName;
    use std::collections::HashMap;

    fn app(toml: &str) -> Result<App> {
        App::bootstrap(Settings::from_toml(toml, HashMap::new())?)
    }

    #[test]
    fn test_implied_command_queue() {
        let app = app("[workers]\nemails = 2").unwrap();
        assert_eq!(app.counts.get(&QueueName::new("emails").unwrap()), Some(2));
        assert_eq!(app.counts.get(&QueueName::new("default").unwrap()), Some(1));
        assert!(app.tasks.get(COMMAND_TASK).is_some());
    }

    #[test]
    fn test_transaction_middleware_skipped_without_database() {
        let app = app("").unwrap();
        assert_eq!(app.executor.middleware().names(), vec!["logging"]);
    }

    #[test]
    fn test_unknown_names_fail_fast() {
        assert!(app(r#"middleware = ["logging", "tracing"]"#).is_err());
        assert!(app(r#"default_backend = "redis""#).is_err());
        assert!(app("[backend_overrides]\nemails = \"redis\"").is_err());
    }

    #[tokio::test]
    async fn test_synchronous_enqueue_runs_noop() {
        let app = app("").unwrap();
        let job = app
            .producer()
            .enqueue(lightq_core::application::EnqueueRequest::new(NOOP_TASK))
            .await
            .unwrap();
        assert_eq!(job.queue.as_str(), "default");
    }
}
