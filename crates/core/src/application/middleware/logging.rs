// Logging middleware: one line when a job starts, one when it ends

use crate::domain::Job;
use crate::error::Result;
use crate::port::{Middleware, Next};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{error, info};

pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, job: &Job, next: Next<'_>) -> Result<()> {
        info!(task = %job.task, queue = %job.queue, args = ?job.args, "Running job");
        let started = Instant::now();

        let result = next.run(job).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(task = %job.task, duration_ms, "Finished job"),
            Err(e) => error!(task = %job.task, duration_ms, error = %e, "Job failed"),
        }
        result
    }
}
