// Job executor: task lookup + middleware chain + panic isolation

use super::middleware::MiddlewareChain;
use super::tasks::TaskRegistry;
use super::worker::guard_future;
use crate::domain::Job;
use crate::error::{AppError, Result};
use crate::port::Task;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs jobs the same way for every caller (worker loop, synchronous backend)
#[derive(Clone)]
pub struct JobExecutor {
    tasks: Arc<TaskRegistry>,
    middleware: Arc<MiddlewareChain>,
}

impl JobExecutor {
    pub fn new(tasks: Arc<TaskRegistry>, middleware: MiddlewareChain) -> Self {
        Self {
            tasks,
            middleware: Arc::new(middleware),
        }
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Execute `job` through the middleware chain.
    ///
    /// Never panics: task and middleware panics come back as `AppError::Panicked`.
    /// An unknown task still passes through the chain so middleware observe the failure.
    pub async fn execute(&self, job: &Job) -> Result<()> {
        let task: Arc<dyn Task> = match self.tasks.get(&job.task) {
            Some(task) => task,
            None => Arc::new(MissingTask),
        };
        guard_future(self.middleware.run(job, task.as_ref())).await
    }
}

struct MissingTask;

#[async_trait]
impl Task for MissingTask {
    async fn run(&self, job: &Job) -> Result<()> {
        Err(AppError::TaskNotFound(job.task.clone()))
    }
}
