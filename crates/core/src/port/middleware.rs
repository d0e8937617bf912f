// Middleware Port (Interface)
// Around-hooks wrapping a single job execution.

use crate::domain::Job;
use crate::error::Result;
use crate::port::Task;
use async_trait::async_trait;

/// Wrapper around one job's execution.
///
/// Code before `next.run(job)` is the "before" phase, code after it the "after"
/// phase. Returning an error without calling `next` stops the job and every inner
/// middleware; outer middleware still see the error come back from their `next`.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in configuration and logs
    fn name(&self) -> &'static str;

    async fn handle(&self, job: &Job, next: Next<'_>) -> Result<()>;
}

/// The remainder of the chain, ending in the task itself
pub struct Next<'a> {
    chain: &'a [Box<dyn Middleware>],
    task: &'a dyn Task,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Box<dyn Middleware>], task: &'a dyn Task) -> Self {
        Self { chain, task }
    }

    /// Run the inner middleware and the task
    pub async fn run(self, job: &Job) -> Result<()> {
        match self.chain.split_first() {
            Some((outer, rest)) => outer.handle(job, Next::new(rest, self.task)).await,
            None => self.task.run(job).await,
        }
    }
}
