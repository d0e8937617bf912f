// Application Layer - Use Cases and Runtime

pub mod backends;
pub mod executor;
pub mod middleware;
pub mod partition;
pub mod producer;
pub mod queue_registry;
pub mod restart;
pub mod synchronous;
pub mod tasks;
pub mod worker;

// Re-exports
pub use backends::{BackendFactory, BackendRegistry, BackendSelection, Backends};
pub use executor::JobExecutor;
pub use middleware::{
    current_transaction, CurrentTransaction, MiddlewareChain, MiddlewareContext, MiddlewareRegistry, DEFAULT_MIDDLEWARE,
};
pub use partition::{owned_workers, plan, Placement};
pub use producer::{EnqueueRequest, Producer};
pub use queue_registry::{QueueCounts, QueueRegistry};
pub use restart::RestartPolicy;
pub use synchronous::{SynchronousBackend, SYNCHRONOUS_BACKEND};
pub use tasks::TaskRegistry;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerState, WorkerStats};
