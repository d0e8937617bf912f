// Worker process supervisor
//
// One OS process per owned (queue, worker_number). Children that exit on their
// own are respawned with backoff; on shutdown every child gets SIGTERM, and
// whatever is still alive after the grace period gets SIGKILL.
//
// Signals go through the task that waits on the child, which only signals a
// pid it has not reaped yet.

use lightq_core::application::restart::RestartPolicy;
use lightq_core::application::worker::constants::DEFAULT_SHUTDOWN_GRACE_PERIOD;
use lightq_core::application::worker::ShutdownToken;
use lightq_core::domain::WorkerId;
use lightq_core::error::Result;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

use crate::template::PathTemplate;

/// Upper bound on reaping children after SIGKILL
const REAP_AFTER_KILL: Duration = Duration::from_secs(5);

/// Starts the process for one worker
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, worker: &WorkerId) -> Result<Child>;
}

/// Re-executes a program (normally the current binary) with the hidden
/// `worker` subcommand. The child reads the configuration itself.
pub struct ProcessLauncher {
    program: PathBuf,
    leading_args: Vec<OsString>,
    log_template: Option<PathTemplate>,
    touch_template: Option<PathTemplate>,
}

impl ProcessLauncher {
    /// # Arguments
    /// * `program` - Executable to run
    /// * `leading_args` - Global arguments placed before the subcommand (config path, verbosity)
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            log_template: None,
            touch_template: None,
        }
    }

    /// Relaunch the running executable
    pub fn current_exe(leading_args: Vec<OsString>) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, leading_args))
    }

    pub fn with_log_template(mut self, template: Option<PathTemplate>) -> Self {
        self.log_template = template;
        self
    }

    pub fn with_touch_template(mut self, template: Option<PathTemplate>) -> Self {
        self.touch_template = template;
        self
    }

    /// Full argument list for `worker`
    pub fn args_for(&self, worker: &WorkerId) -> Vec<OsString> {
        let mut args = self.leading_args.clone();
        args.extend([
            "worker".into(),
            "--queue".into(),
            worker.queue.as_str().into(),
            "--worker-number".into(),
            worker.number.to_string().into(),
        ]);
        let token = worker.file_token();
        if let Some(template) = &self.log_template {
            args.push("--logfile".into());
            args.push(template.render(&token).into_os_string());
        }
        if let Some(template) = &self.touch_template {
            args.push("--touchfile".into());
            args.push(template.render(&token).into_os_string());
        }
        args
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, worker: &WorkerId) -> Result<Child> {
        Ok(Command::new(&self.program)
            .args(self.args_for(worker))
            .spawn()?)
    }
}

/// Outcome of a supervisor run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Some child outlived the grace period and was killed
    pub forced: bool,
    /// Respawns performed after unrequested exits
    pub restarts: u64,
}

struct Exit {
    worker: WorkerId,
    status: io::Result<ExitStatus>,
    uptime: Duration,
}

pub struct Supervisor<L> {
    launcher: L,
    restart: RestartPolicy,
    grace_period: Duration,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            restart: RestartPolicy::default(),
            grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
        }
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Run `workers` until `shutdown`, then stop them.
    pub async fn run(&self, workers: Vec<WorkerId>, mut shutdown: ShutdownToken) -> Result<SupervisorReport> {
        let mut state = FleetState::default();
        for worker in workers {
            state.start(&self.launcher, &self.restart, worker);
        }
        info!(workers = state.live.len(), "Supervisor started");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                Some(joined) = state.exits.join_next(), if !state.exits.is_empty() => {
                    let Ok(exit) = joined else { continue };
                    if shutdown.is_shutdown() {
                        state.live.remove(&exit.worker);
                        break;
                    }
                    state.on_exit(&self.restart, exit);
                }
                Some(joined) = state.respawns.join_next(), if !state.respawns.is_empty() => {
                    let Ok(worker) = joined else { continue };
                    if shutdown.is_shutdown() {
                        break;
                    }
                    state.report.restarts += 1;
                    state.start(&self.launcher, &self.restart, worker);
                }
            }
        }

        info!(workers = state.live.len(), "Stopping workers");
        state.respawns.abort_all();
        state.stop(self.grace_period).await;
        Ok(state.report)
    }
}

/// A child whose exit has not been observed yet
struct LiveChild {
    pid: u32,
    signals: mpsc::UnboundedSender<Signal>,
}

#[derive(Default)]
struct FleetState {
    live: HashMap<WorkerId, LiveChild>,
    /// Consecutive unrequested exits per worker
    failures: HashMap<WorkerId, u32>,
    exits: JoinSet<Exit>,
    respawns: JoinSet<WorkerId>,
    report: SupervisorReport,
}

impl FleetState {
    fn start<L: WorkerLauncher>(&mut self, launcher: &L, policy: &RestartPolicy, worker: WorkerId) {
        let mut child = match launcher.launch(&worker) {
            Ok(child) => child,
            Err(e) => {
                error!(worker = %worker, error = %e, "Failed to launch worker");
                self.schedule_respawn(policy, worker, Duration::ZERO);
                return;
            }
        };

        let Some(pid) = child.id() else {
            // Already reaped; treat like an immediate exit
            self.schedule_respawn(policy, worker, Duration::ZERO);
            return;
        };
        info!(worker = %worker, pid, "Worker launched");
        let (signals, mut pending) = mpsc::unbounded_channel();
        self.live.insert(worker.clone(), LiveChild { pid, signals });

        let started = Instant::now();
        self.exits.spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(signal) = pending.recv() => {
                        // None once the child has been reaped
                        if let Some(pid) = child.id() {
                            signal_child(&worker, pid, signal);
                        }
                    }
                }
            };
            Exit {
                worker,
                status,
                uptime: started.elapsed(),
            }
        });
    }

    fn on_exit(&mut self, policy: &RestartPolicy, exit: Exit) {
        self.live.remove(&exit.worker);
        match &exit.status {
            Ok(status) => warn!(
                worker = %exit.worker,
                %status,
                uptime_secs = exit.uptime.as_secs(),
                "Worker exited unexpectedly"
            ),
            Err(e) => error!(worker = %exit.worker, error = %e, "Lost track of worker process"),
        }
        self.schedule_respawn(policy, exit.worker, exit.uptime);
    }

    fn schedule_respawn(&mut self, policy: &RestartPolicy, worker: WorkerId, uptime: Duration) {
        let previous = self.failures.get(&worker).copied().unwrap_or(0);
        let failures = policy.record_exit(previous, uptime);
        self.failures.insert(worker.clone(), failures);

        let delay = policy.delay_for(failures);
        self.respawns.spawn(async move {
            sleep(delay).await;
            worker
        });
    }

    /// Ask the task owning `worker`'s child to deliver `signal`.
    /// Returns false when that child has already exited.
    fn signal(&self, worker: &WorkerId, signal: Signal) -> bool {
        self.live
            .get(worker)
            .is_some_and(|child| child.signals.send(signal).is_ok())
    }

    /// SIGTERM everything, wait out the grace period, SIGKILL the rest
    async fn stop(&mut self, grace_period: Duration) {
        for worker in self.live.keys() {
            self.signal(worker, Signal::SIGTERM);
        }

        let drained = timeout(grace_period, drain(&mut self.exits, &mut self.live)).await;
        if drained.is_ok() {
            info!("All workers stopped");
            return;
        }

        self.report.forced = true;
        for (worker, child) in &self.live {
            if self.signal(worker, Signal::SIGKILL) {
                warn!(
                    worker = %worker,
                    pid = child.pid,
                    grace_secs = grace_period.as_secs(),
                    "Worker did not stop in time, sending SIGKILL"
                );
            }
        }
        if timeout(REAP_AFTER_KILL, drain(&mut self.exits, &mut self.live))
            .await
            .is_err()
        {
            error!(remaining = self.live.len(), "Workers still running after SIGKILL");
        }
    }
}

async fn drain(exits: &mut JoinSet<Exit>, live: &mut HashMap<WorkerId, LiveChild>) {
    while let Some(joined) = exits.join_next().await {
        if let Ok(exit) = joined {
            info!(worker = %exit.worker, "Worker stopped");
            live.remove(&exit.worker);
        }
    }
}

fn signal_child(worker: &WorkerId, pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else { return };
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(worker = %worker, pid, %signal, error = %e, "Failed to signal worker"),
    }
}
