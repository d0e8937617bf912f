// Port Layer - Interfaces for external dependencies

pub mod backend;
pub mod liveness;
pub mod middleware;
pub mod task;
pub mod time_provider; // For deterministic testing
pub mod transaction;

// Re-exports
pub use backend::{
    deduplicate_queue, Backend, Deduplicate, DeduplicateOutcome, NullProgressLogger,
    ProgressLogger,
};
pub use liveness::LivenessMarker;
pub use middleware::{Middleware, Next};
pub use task::{FnTask, NoopTask, Task};
pub use time_provider::TimeProvider;
pub use transaction::{Transaction, TransactionManager};
