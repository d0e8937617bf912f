// Domain Layer - Pure value types

pub mod error;
pub mod job;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::Job;
pub use queue::{MachineShard, QueueName, WorkerId, WorkerNumber};
