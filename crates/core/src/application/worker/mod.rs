// Worker - Job execution loop for one (queue, worker_number)

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{guard_future, panic_message};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::executor::JobExecutor;
use crate::domain::{Job, WorkerId};
use crate::error::Result;
use crate::port::{Backend, LivenessMarker};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Lifecycle of a worker loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "STARTING"),
            WorkerState::Idle => write!(f, "IDLE"),
            WorkerState::Running => write!(f, "RUNNING"),
            WorkerState::Stopping => write!(f, "STOPPING"),
            WorkerState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs attempted, successful or not
    pub processed: u64,
    /// Attempts that ended in an error or panic
    pub failed: u64,
}

/// Worker pulls jobs for one queue and runs them until shutdown
pub struct Worker {
    id: WorkerId,
    backend: Arc<dyn Backend>,
    executor: JobExecutor,
    liveness: Option<Arc<dyn LivenessMarker>>,
    dequeue_timeout: Duration,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(id: WorkerId, backend: Arc<dyn Backend>, executor: JobExecutor) -> Self {
        let (state, _) = watch::channel(WorkerState::Starting);
        Self {
            id,
            backend,
            executor,
            liveness: None,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            state,
        }
    }

    /// Bound on each blocking dequeue; shutdown is noticed within this time
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Marker touched after every job attempt
    pub fn with_liveness(mut self, marker: Arc<dyn LivenessMarker>) -> Self {
        self.liveness = Some(marker);
        self
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Run the worker loop until `shutdown` is requested.
    ///
    /// # Errors
    /// Only startup errors (`Backend::startup`) are returned; job and backend
    /// failures during the loop are logged and the loop carries on.
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<WorkerStats> {
        let span = info_span!("worker", queue = %self.id.queue, worker_number = self.id.number);
        self.run_loop(shutdown).instrument(span).await
    }

    async fn run_loop(&self, mut shutdown: ShutdownToken) -> Result<WorkerStats> {
        self.set_state(WorkerState::Starting);
        if let Err(e) = self.backend.startup(&self.id.queue).await {
            error!(error = %e, backend = self.backend.name(), "Backend startup failed");
            self.set_state(WorkerState::Stopped);
            return Err(e);
        }
        info!(backend = self.backend.name(), "Worker started");

        let mut stats = WorkerStats::default();
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.set_state(WorkerState::Idle);

            match self
                .backend
                .dequeue(&self.id.queue, self.id.number, self.dequeue_timeout)
                .await
            {
                Ok(Some(job)) => {
                    self.set_state(WorkerState::Running);
                    self.process_job(&job, &mut stats).await;
                }
                Ok(None) => {
                    debug!("No job available");
                }
                Err(e) => {
                    error!(error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                        }
                    }
                }
            }
        }

        self.set_state(WorkerState::Stopping);
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Worker shutting down"
        );
        self.set_state(WorkerState::Stopped);
        Ok(stats)
    }

    /// Execute one job and acknowledge it, whatever the outcome
    async fn process_job(&self, job: &Job, stats: &mut WorkerStats) {
        stats.processed += 1;
        if let Err(e) = self.executor.execute(job).await {
            stats.failed += 1;
            error!(task = %job.task, error = %e, "Job raised an error; continuing");
        }

        if let Err(e) = self
            .backend
            .processed_job(&self.id.queue, self.id.number, job)
            .await
        {
            warn!(task = %job.task, error = %e, "Failed to acknowledge processed job");
        }

        if let Some(marker) = &self.liveness {
            if let Err(e) = marker.touch() {
                warn!(error = %e, "Failed to touch liveness marker");
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }
}
