//! `lightq configuration`: what this machine would run, and with what

use super::bootstrap;
use crate::{Cli, ShardArgs};
use anyhow::Result;
use colored::Colorize;
use lightq_core::application::owned_workers;
use std::process::ExitCode;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    backend: String,
    workers: u32,
    #[tabled(rename = "this machine")]
    local: String,
}

pub async fn execute(cli: &Cli, shard_args: &ShardArgs) -> Result<ExitCode> {
    let app = bootstrap(cli)?;
    let shard = shard_args.shard()?;
    let owned = owned_workers(&app.counts, shard);

    println!("{}", "Configuration".cyan().bold());
    println!();
    println!("  {:<18}{}", "default backend:", app.backends.selection().default);
    println!("  {:<18}{}", "middleware:", app.executor.middleware().names().join(", "));
    println!(
        "  {:<18}{}s",
        "dequeue timeout:",
        app.settings.dequeue_timeout_secs
    );
    println!("  {:<18}{}s", "shutdown grace:", app.settings.shutdown_grace_secs);
    println!("  {:<18}{}", "machine:", shard);
    println!();

    let rows: Vec<QueueRow> = app
        .counts
        .iter()
        .map(|(queue, workers)| {
            let local: Vec<String> = owned
                .iter()
                .filter(|w| &w.queue == queue)
                .map(|w| w.number.to_string())
                .collect();
            QueueRow {
                queue: queue.to_string(),
                backend: app.backends.backend_name(queue).to_string(),
                workers,
                local: if local.is_empty() {
                    "-".to_string()
                } else {
                    local.join(", ")
                },
            }
        })
        .collect();
    println!("{}", Table::new(rows));
    println!();
    println!(
        "{}",
        format!(
            "{} of {} workers run on this machine",
            owned.len(),
            app.counts.total_workers()
        )
        .bold()
    );
    Ok(ExitCode::SUCCESS)
}
