//! `lightq enqueue`

use super::bootstrap;
use crate::{Cli, EnqueueArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use lightq_core::application::EnqueueRequest;
use lightq_core::domain::QueueName;
use serde_json::{Map, Value};
use std::process::ExitCode;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct EnqueueResult {
    task: String,
    queue: String,
    backend: String,
    enqueued_at: String,
}

pub async fn execute(cli: &Cli, args: &EnqueueArgs) -> Result<ExitCode> {
    let app = bootstrap(cli)?;
    let request = parse_request(args)?;

    let job = app.producer().enqueue(request).await?;

    println!("{}", "✓ Job enqueued successfully".green().bold());
    println!();
    let result = EnqueueResult {
        task: job.task.clone(),
        queue: job.queue.to_string(),
        backend: app.backends.backend_name(&job.queue).to_string(),
        enqueued_at: job.enqueued_at.to_rfc3339(),
    };
    println!("{}", Table::new(vec![result]));
    Ok(ExitCode::SUCCESS)
}

fn parse_request(args: &EnqueueArgs) -> Result<EnqueueRequest> {
    let positional: Vec<Value> =
        serde_json::from_str(&args.args).context("--args must be a JSON array")?;
    let keyword: Map<String, Value> =
        serde_json::from_str(&args.kwargs).context("--kwargs must be a JSON object")?;

    let mut request = EnqueueRequest::new(&args.task);
    request.args = positional;
    request.kwargs = keyword;
    request.queue = args
        .queue
        .as_deref()
        .map(QueueName::new)
        .transpose()?;
    Ok(request)
}
