//! `lightq worker`: one worker loop in this process

use super::bootstrap;
use crate::app::App;
use crate::{Cli, WorkerArgs};
use anyhow::{bail, Context, Result};
use lightq_core::application::Worker;
use lightq_core::domain::{QueueName, WorkerId};
use lightq_infra_system::{set_process_title, shutdown_on_signals, worker_title, TouchFile};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

pub async fn execute(cli: &Cli, args: &WorkerArgs) -> Result<ExitCode> {
    let app = bootstrap(cli)?;
    let queue = QueueName::new(args.queue.as_str())?;
    let worker = WorkerId::new(queue, args.worker_number)?;
    run_in_process(&app, worker, args.touchfile.clone()).await
}

/// Run `worker` until SIGTERM/SIGINT. Also used by `run --only-queue`.
///
/// Must be awaited from `main`'s own task so the process title lands on the main thread.
pub async fn run_in_process(app: &App, worker: WorkerId, touchfile: Option<PathBuf>) -> Result<ExitCode> {
    let numbers = app.counts.worker_numbers(&worker.queue)?;
    if !numbers.contains(&worker.number) {
        bail!(
            "queue '{}' has {} worker(s); there is no worker {}",
            worker.queue,
            numbers.end(),
            worker.number
        );
    }

    set_process_title(&worker_title(&worker));
    let (_sender, shutdown) = shutdown_on_signals()?;

    let backend = app
        .backends
        .for_queue(&worker.queue)
        .await
        .with_context(|| format!("Failed to initialise backend for queue '{}'", worker.queue))?;

    let mut runner = Worker::new(worker.clone(), backend, app.executor.clone())
        .with_dequeue_timeout(app.settings.dequeue_timeout());
    if let Some(path) = touchfile {
        info!(path = %path.display(), "Touching liveness file after each job");
        runner = runner.with_liveness(Arc::new(TouchFile::new(path)));
    }

    let stats = runner.run(shutdown).await?;
    info!(
        worker = %worker,
        processed = stats.processed,
        failed = stats.failed,
        "Worker exited cleanly"
    );
    Ok(ExitCode::SUCCESS)
}
