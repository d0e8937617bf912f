// Task Port (Interface)
// The code a job's `task` name resolves to.

use crate::domain::Job;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;

/// Task body.
///
/// Implementations:
/// - CommandTask: runs an external program (infra-system)
/// - FnTask: adapts an async closure
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, job: &Job) -> Result<()>;
}

/// Adapts an async closure taking the job by value
pub struct FnTask<F>(F);

impl<F> FnTask<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn run(&self, job: &Job) -> Result<()> {
        (self.0)(job.clone()).await
    }
}

/// Task that does nothing; useful for smoke-testing a fleet
pub struct NoopTask;

#[async_trait]
impl Task for NoopTask {
    async fn run(&self, _job: &Job) -> Result<()> {
        Ok(())
    }
}
