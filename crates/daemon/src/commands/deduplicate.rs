//! `lightq deduplicate QUEUE`

use super::bootstrap;
use crate::Cli;
use anyhow::{bail, Result};
use colored::Colorize;
use lightq_core::domain::QueueName;
use lightq_core::port::{deduplicate_queue, ProgressLogger};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Reports scan progress in steps of ten percent
#[derive(Default)]
struct StepProgress {
    last_step: AtomicU64,
}

impl ProgressLogger for StepProgress {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn progress(&self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let step = done * 10 / total;
        if self.last_step.fetch_max(step, Ordering::Relaxed) < step {
            info!(done, total, "Deduplication {}% scanned", step * 10);
        }
    }
}

pub async fn execute(cli: &Cli, queue: &str) -> Result<ExitCode> {
    let app = bootstrap(cli)?;
    let queue = QueueName::new(queue)?;
    if !app.counts.contains(&queue) {
        bail!("queue '{}' is not configured", queue);
    }

    let backend = app.backends.for_queue(&queue).await?;
    let outcome = deduplicate_queue(backend.as_ref(), &queue, &StepProgress::default()).await?;

    println!(
        "{}",
        format!(
            "✓ Removed {} duplicate(s) of {} waiting job(s) on '{}'",
            outcome.removed, outcome.scanned, queue
        )
        .green()
        .bold()
    );
    Ok(ExitCode::SUCCESS)
}
