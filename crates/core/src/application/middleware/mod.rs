// Middleware chain and registry

mod logging;
mod transaction;

pub use logging::LoggingMiddleware;
pub use transaction::{current_transaction, CurrentTransaction, TransactionMiddleware};

use crate::domain::Job;
use crate::error::{AppError, Result};
use crate::port::{Middleware, Next, Task, TransactionManager};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Middleware order used when configuration does not name one
pub const DEFAULT_MIDDLEWARE: &[&str] = &["logging", "transaction"];

/// Ordered middleware, outermost first
#[derive(Default)]
pub struct MiddlewareChain {
    middleware: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(middleware: Vec<Box<dyn Middleware>>) -> Self {
        Self { middleware }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run `task` for `job` wrapped in every middleware
    pub async fn run(&self, job: &Job, task: &dyn Task) -> Result<()> {
        Next::new(&self.middleware, task).run(job).await
    }
}

/// What middleware factories may draw on when a worker process starts
#[derive(Clone, Default)]
pub struct MiddlewareContext {
    pub transactions: Option<Arc<dyn TransactionManager>>,
}

/// Builds one middleware instance, or `None` when its prerequisites are missing
pub type MiddlewareFactory =
    Arc<dyn Fn(&MiddlewareContext) -> Result<Option<Box<dyn Middleware>>> + Send + Sync>;

/// Middleware name -> factory
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: BTreeMap<String, MiddlewareFactory>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `logging` and `transaction`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("logging", |_ctx: &MiddlewareContext| {
            Ok(Some(Box::new(LoggingMiddleware) as Box<dyn Middleware>))
        });
        registry.register("transaction", |ctx: &MiddlewareContext| {
            Ok(ctx.transactions.clone().map(|manager| {
                Box::new(TransactionMiddleware::new(manager)) as Box<dyn Middleware>
            }))
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&MiddlewareContext) -> Result<Option<Box<dyn Middleware>>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the configured middleware in order, skipping opted-out ones
    pub fn build<S: AsRef<str>>(
        &self,
        names: &[S],
        ctx: &MiddlewareContext,
    ) -> Result<MiddlewareChain> {
        let mut middleware = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| AppError::Config(format!("unknown middleware '{}'", name)))?;
            match factory(ctx)? {
                Some(instance) => middleware.push(instance),
                None => debug!(middleware = name, "Middleware not used"),
            }
        }
        let chain = MiddlewareChain::new(middleware);
        info!(middleware = ?chain.names(), "Loaded middleware");
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::transaction::mocks::RecordingTransactionManager;
    use crate::port::FnTask;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        log: Log,
        fail_before: bool,
        fail_after: bool,
    }

    impl Recording {
        fn boxed(name: &'static str, log: &Log) -> Box<dyn Middleware> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail_before: false,
                fail_after: false,
            })
        }

        fn push(&self, event: String) {
            self.log.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl Middleware for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, job: &Job, next: Next<'_>) -> Result<()> {
            self.push(format!("{}.before", self.name));
            if self.fail_before {
                return Err(AppError::Middleware(format!("{} refused", self.name)));
            }
            let result = next.run(job).await;
            self.push(format!(
                "{}.after({})",
                self.name,
                if result.is_ok() { "ok" } else { "err" }
            ));
            if self.fail_after {
                return Err(AppError::Middleware(format!("{} after failed", self.name)));
            }
            result
        }
    }

    fn recording_task(log: &Log, fail: bool) -> impl Task {
        let log = log.clone();
        FnTask::new(move |_job: Job| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("job".to_string());
                if fail {
                    Err(AppError::task("boom"))
                } else {
                    Ok(())
                }
            }
        })
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_order_outermost_first() {
        let log = Log::default();
        let chain =
            MiddlewareChain::new(vec![Recording::boxed("A", &log), Recording::boxed("B", &log)]);

        let result = chain
            .run(&Job::new_test("t", "q"), &recording_task(&log, false))
            .await;

        assert!(result.is_ok());
        assert_eq!(
            events(&log),
            vec!["A.before", "B.before", "job", "B.after(ok)", "A.after(ok)"]
        );
    }

    #[tokio::test]
    async fn test_after_hooks_run_when_job_fails() {
        let log = Log::default();
        let chain =
            MiddlewareChain::new(vec![Recording::boxed("A", &log), Recording::boxed("B", &log)]);

        let result = chain
            .run(&Job::new_test("t", "q"), &recording_task(&log, true))
            .await;

        assert!(matches!(result, Err(AppError::Task(_))));
        assert_eq!(
            events(&log),
            vec!["A.before", "B.before", "job", "B.after(err)", "A.after(err)"]
        );
    }

    #[tokio::test]
    async fn test_failing_before_skips_job_and_inner_hooks() {
        let log = Log::default();
        let refusing: Box<dyn Middleware> = Box::new(Recording {
            name: "B",
            log: log.clone(),
            fail_before: true,
            fail_after: false,
        });
        let chain = MiddlewareChain::new(vec![
            Recording::boxed("A", &log),
            refusing,
            Recording::boxed("C", &log),
        ]);

        let result = chain
            .run(&Job::new_test("t", "q"), &recording_task(&log, false))
            .await;

        assert!(matches!(result, Err(AppError::Middleware(_))));
        assert_eq!(events(&log), vec!["A.before", "B.before", "A.after(err)"]);
    }

    #[tokio::test]
    async fn test_inner_after_failure_reaches_outer_after() {
        let log = Log::default();
        let failing_after: Box<dyn Middleware> = Box::new(Recording {
            name: "B",
            log: log.clone(),
            fail_before: false,
            fail_after: true,
        });
        let chain = MiddlewareChain::new(vec![Recording::boxed("A", &log), failing_after]);

        let result = chain
            .run(&Job::new_test("t", "q"), &recording_task(&log, false))
            .await;

        assert!(result.is_err());
        assert_eq!(
            events(&log),
            vec!["A.before", "B.before", "job", "B.after(ok)", "A.after(err)"]
        );
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let manager = RecordingTransactionManager::new();
        let transaction: Box<dyn Middleware> =
            Box::new(TransactionMiddleware::new(Arc::new(manager.clone())));
        let chain = MiddlewareChain::new(vec![transaction]);
        let log = Log::default();

        chain
            .run(&Job::new_test("t", "q"), &recording_task(&log, false))
            .await
            .unwrap();
        let failed = chain
            .run(&Job::new_test("t", "q"), &recording_task(&log, true))
            .await;

        assert!(matches!(failed, Err(AppError::Task(_))));
        assert_eq!(
            manager.events(),
            vec!["begin", "commit", "begin", "rollback"]
        );
    }

    #[tokio::test]
    async fn test_task_sees_open_transaction() {
        let manager = RecordingTransactionManager::new();
        let transaction: Box<dyn Middleware> =
            Box::new(TransactionMiddleware::new(Arc::new(manager.clone())));
        let chain = MiddlewareChain::new(vec![transaction]);
        let task = FnTask::new(|_job: Job| async move {
            match current_transaction().await {
                Some(_tx) => Ok(()),
                None => Err(AppError::task("no transaction in scope")),
            }
        });

        chain.run(&Job::new_test("t", "q"), &task).await.unwrap();
        assert_eq!(manager.events(), vec!["begin", "commit"]);

        // Outside the middleware there is nothing to find
        assert!(current_transaction().await.is_none());
        assert!(matches!(
            MiddlewareChain::empty()
                .run(&Job::new_test("t", "q"), &task)
                .await,
            Err(AppError::Task(_))
        ));
    }

    #[test]
    fn test_registry_opt_out_and_unknown_names() {
        let registry = MiddlewareRegistry::with_builtins();

        // No transaction manager: transaction middleware opts out at construction
        let chain = registry
            .build(DEFAULT_MIDDLEWARE, &MiddlewareContext::default())
            .unwrap();
        assert_eq!(chain.names(), vec!["logging"]);

        let ctx = MiddlewareContext {
            transactions: Some(Arc::new(RecordingTransactionManager::new())),
        };
        let chain = registry.build(DEFAULT_MIDDLEWARE, &ctx).unwrap();
        assert_eq!(chain.names(), vec!["logging", "transaction"]);

        assert!(matches!(
            registry.build(&["logging", "nope"], &ctx),
            Err(AppError::Config(_))
        ));
    }
}
