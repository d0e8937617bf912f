//! `lightq depth`: backlog per queue

use super::bootstrap;
use crate::Cli;
use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct QueueDepth {
    queue: String,
    backend: String,
    workers: u32,
    waiting: String,
}

pub async fn execute(cli: &Cli) -> Result<ExitCode> {
    let app = bootstrap(cli)?;

    let mut rows = Vec::with_capacity(app.counts.len());
    let mut failures = 0;
    for (queue, workers) in app.counts.iter() {
        let waiting = match app.backends.for_queue(queue).await {
            Ok(backend) => backend.length(queue).await,
            Err(e) => Err(e),
        };
        let waiting = match waiting {
            Ok(length) => length.to_string(),
            Err(e) => {
                failures += 1;
                format!("error: {}", e)
            }
        };
        rows.push(QueueDepth {
            queue: queue.to_string(),
            backend: app.backends.backend_name(queue).to_string(),
            workers,
            waiting,
        });
    }

    println!("{}", "Queue depth".cyan().bold());
    println!();
    println!("{}", Table::new(rows));

    if failures > 0 {
        println!();
        println!("{}", format!("{} queue(s) could not be read", failures).yellow());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
