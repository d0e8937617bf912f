// Queue Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Queue identifier.
///
/// Opaque to the runtime apart from ordering: partitioning enumerates queues in
/// lexical order of their names, so the ordering here must stay `String` ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::InvalidQueueName(name, "must not be empty"));
        }
        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(DomainError::InvalidQueueName(name, "too long"));
        }
        // Names end up in file names and process titles.
        if name
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || c == '/')
        {
            return Err(DomainError::InvalidQueueName(
                name,
                "must not contain whitespace, control characters or '/'",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueueName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

impl std::str::FromStr for QueueName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1-based worker number, unique within a queue
pub type WorkerNumber = u32;

/// Identity of one worker process: `(queue, worker_number)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId {
    pub queue: QueueName,
    pub number: WorkerNumber,
}

impl WorkerId {
    pub fn new(queue: QueueName, number: WorkerNumber) -> Result<Self> {
        if number == 0 {
            return Err(DomainError::InvalidWorkerNumber(number));
        }
        Ok(Self { queue, number })
    }

    /// Token used to fill per-worker path templates, e.g. `emails-2`
    pub fn file_token(&self) -> String {
        format!("{}-{}", self.queue, self.number)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.queue, self.number)
    }
}

/// This machine's position in the fleet: machine `number` of `count`, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineShard {
    number: u32,
    count: u32,
}

impl MachineShard {
    pub fn new(number: u32, count: u32) -> Result<Self> {
        if count == 0 || number == 0 || number > count {
            return Err(DomainError::InvalidShard { number, count });
        }
        Ok(Self { number, count })
    }

    /// The whole fleet is this one machine
    pub fn single() -> Self {
        Self {
            number: 1,
            count: 1,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl fmt::Display for MachineShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.number, self.count)
    }
}
