//! lightq - background job queue
//!
//! `lightq run` supervises this machine's worker processes; the other
//! subcommands are operator tools sharing the same configuration.

mod app;
mod commands;
mod logging;
mod settings;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use lightq_infra_system::{PathTemplate, MASTER_TOKEN};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Parser)]
#[command(name = "lightq")]
#[command(about = "Lightweight background job queue", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "LIGHTQ_CONFIG")]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run this machine's share of the queue workers
    Run(RunArgs),

    /// Run a single worker (started by `run`)
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Enqueue a job
    Enqueue(EnqueueArgs),

    /// Show the backlog of every queue
    Depth,

    /// Remove duplicate jobs waiting on a queue
    Deduplicate {
        /// Queue name
        queue: String,
    },

    /// Print the effective configuration and this machine's workers
    Configuration(ShardArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ShardArgs {
    /// This machine's number, 1-based
    #[arg(long, default_value_t = 1)]
    machine: u32,

    /// Total number of machines
    #[arg(long, default_value_t = 1)]
    of: u32,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    shard: ShardArgs,

    /// Run only worker 1 of this queue, in the foreground (debugging)
    #[arg(long, conflicts_with_all = ["machine", "of"])]
    only_queue: Option<String>,

    /// Log file; `{}` becomes the process token (`emails-1`, `master`)
    #[arg(long)]
    logfile: Option<String>,

    /// Touch file updated after every job; must contain `{}`
    #[arg(long)]
    touchfile: Option<String>,
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    queue: String,

    #[arg(long)]
    worker_number: u32,

    /// Already rendered log file
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Already rendered touch file
    #[arg(long)]
    touchfile: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Registered task name (e.g. command, noop)
    task: String,

    /// Queue (default: the task's queue)
    #[arg(short, long)]
    queue: Option<String>,

    /// Positional arguments as a JSON array
    #[arg(long, default_value = "[]")]
    args: String,

    /// Keyword arguments as a JSON object
    #[arg(long, default_value = "{}")]
    kwargs: String,
}

impl Cli {
    fn logfile(&self) -> Option<PathBuf> {
        match &self.command {
            Commands::Run(args) => args
                .logfile
                .as_deref()
                .map(|template| PathTemplate::new(template).render(MASTER_TOKEN)),
            Commands::Worker(args) => args.logfile.clone(),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init(cli.verbose, cli.logfile().as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Commands::Run(args) => commands::run::execute(&cli, args).await,
        Commands::Worker(args) => commands::worker::execute(&cli, args).await,
        Commands::Enqueue(args) => commands::enqueue::execute(&cli, args).await,
        Commands::Depth => commands::depth::execute(&cli).await,
        Commands::Deduplicate { queue } => commands::deduplicate::execute(&cli, queue).await,
        Commands::Configuration(shard) => commands::configuration::execute(&cli, shard).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
