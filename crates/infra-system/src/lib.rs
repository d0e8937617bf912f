// lightq Infrastructure - System Adapters
// Implements: worker process supervision, LivenessMarker, command Task

pub mod command_task;
pub mod liveness;
pub mod process_title;
#[cfg(unix)]
pub mod signals;
#[cfg(unix)]
pub mod supervisor;
pub mod template;

pub use command_task::{CommandTask, COMMAND_TASK};
pub use liveness::TouchFile;
pub use process_title::{set_process_title, worker_title, MASTER_TITLE};
#[cfg(unix)]
pub use signals::shutdown_on_signals;
#[cfg(unix)]
pub use supervisor::{ProcessLauncher, Supervisor, SupervisorReport, WorkerLauncher};
pub use template::{PathTemplate, MASTER_TOKEN};
