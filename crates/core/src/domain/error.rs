// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid queue name {0:?}: {1}")]
    InvalidQueueName(String, &'static str),

    #[error("Invalid worker number {0}: worker numbers start at 1")]
    InvalidWorkerNumber(u32),

    #[error("Invalid machine shard {number} of {count}: expected 1 <= machine <= count")]
    InvalidShard { number: u32, count: u32 },
}

pub type Result<T> = std::result::Result<T, DomainError>;
