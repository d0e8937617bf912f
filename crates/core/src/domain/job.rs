// Job Domain Model

use super::queue::QueueName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of deferred work.
///
/// Backends store and return jobs without looking inside `args`/`kwargs`.
/// A job carries no identity of its own; backends assign one if they need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Symbolic task name, resolved through the task registry at execution time
    pub task: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    pub queue: QueueName,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Create a new Job
    ///
    /// # Arguments
    ///
    /// * `task` - Registered task name
    /// * `args` - Positional arguments
    /// * `kwargs` - Keyword arguments
    /// * `queue` - Queue the job is delivered on
    /// * `enqueued_at` - Enqueue timestamp (injected, not system time)
    pub fn new(
        task: impl Into<String>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        queue: QueueName,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task: task.into(),
            args,
            kwargs,
            queue,
            enqueued_at,
        }
    }

    /// Create a job without arguments stamped with the current time (for tests only)
    pub fn new_test(task: impl Into<String>, queue: &str) -> Self {
        let queue = QueueName::new(queue).unwrap_or_else(|e| panic!("test queue name: {e}"));
        Self::new(task, Vec::new(), Map::new(), queue, Utc::now())
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Equality key for deduplication: task plus arguments, never the timestamp.
    ///
    /// `serde_json::Map` is ordered by key, so equal kwargs render identically.
    pub fn identity(&self) -> String {
        serde_json::json!([self.task, self.args, self.kwargs]).to_string()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
