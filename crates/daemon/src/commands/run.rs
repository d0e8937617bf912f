//! `lightq run`: supervise this machine's worker processes

use super::{bootstrap, worker::run_in_process};
use crate::{Cli, RunArgs};
use anyhow::{Context, Result};
use lightq_core::application::{plan, Placement, RestartPolicy};
use lightq_core::domain::QueueName;
use lightq_infra_system::{
    set_process_title, shutdown_on_signals, PathTemplate, ProcessLauncher, Supervisor,
    MASTER_TITLE,
};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::process::ExitCode;
use tracing::{info, warn};

pub async fn execute(cli: &Cli, args: &RunArgs) -> Result<ExitCode> {
    let app = bootstrap(cli)?;
    let placement = match &args.only_queue {
        Some(queue) => Placement::OnlyQueue(QueueName::new(queue.as_str())?),
        None => Placement::Fleet(args.shard.shard()?),
    };
    let workers = plan(&app.counts, &placement)?;

    // Fail fast: every backend this machine needs must come up before anything is spawned
    let queues: BTreeSet<_> = workers.iter().map(|w| w.queue.clone()).collect();
    for queue in &queues {
        app.backends.for_queue(queue).await.with_context(|| {
            format!(
                "Backend '{}' for queue '{}' is unavailable",
                app.backends.backend_name(queue),
                queue
            )
        })?;
    }

    let touch_template = touch_template(args.touchfile.as_deref());

    if let Placement::OnlyQueue(_) = placement {
        let Some(worker) = workers.into_iter().next() else {
            return Ok(ExitCode::SUCCESS);
        };
        info!(worker = %worker, "Running a single worker in the foreground");
        let touchfile = touch_template.map(|t| t.render(&worker.file_token()));
        return run_in_process(&app, worker, touchfile).await;
    }

    set_process_title(MASTER_TITLE);
    info!(
        placement = ?placement,
        workers = workers.len(),
        total = app.counts.total_workers(),
        "Starting workers"
    );

    let launcher = ProcessLauncher::current_exe(leading_args(cli))?
        .with_log_template(args.logfile.as_deref().map(PathTemplate::new))
        .with_touch_template(touch_template);
    let supervisor = Supervisor::new(launcher)
        .with_restart_policy(RestartPolicy::default())
        .with_grace_period(app.settings.shutdown_grace());

    let (_sender, shutdown) = shutdown_on_signals()?;
    let report = supervisor.run(workers, shutdown).await?;

    info!(restarts = report.restarts, forced = report.forced, "Supervisor stopped");
    if report.forced {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// A touch template must name a file per worker; a fixed path would be shared
/// by every worker and say nothing about any one of them.
fn touch_template(raw: Option<&str>) -> Option<PathTemplate> {
    let template = PathTemplate::new(raw?);
    if template.is_templated() {
        Some(template)
    } else {
        warn!(
            touchfile = %template,
            "Touch file has no '{{}}' placeholder; touch files disabled"
        );
        None
    }
}

/// Global flags repeated for every child
fn leading_args(cli: &Cli) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(config) = &cli.config {
        args.push(OsString::from("--config"));
        args.push(config.clone().into_os_string());
    }
    if cli.verbose > 0 {
        args.push(OsString::from(format!("-{}", "v".repeat(cli.verbose as usize))));
    }
    args
}
