// Producer: build jobs and hand them to the queue's backend

use super::backends::Backends;
use super::tasks::TaskRegistry;
use crate::domain::{Job, QueueName};
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub task: String,

    #[serde(default)]
    pub args: Vec<Value>,

    #[serde(default)]
    pub kwargs: Map<String, Value>,

    /// Overrides the task's registered queue
    #[serde(default)]
    pub queue: Option<QueueName>,
}

impl EnqueueRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            queue: None,
        }
    }
}

pub struct Producer {
    tasks: Arc<TaskRegistry>,
    backends: Arc<Backends>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Producer {
    pub fn new(
        tasks: Arc<TaskRegistry>,
        backends: Arc<Backends>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            tasks,
            backends,
            time_provider,
        }
    }

    /// Enqueue a job, returning it as stored
    ///
    /// # Errors
    /// - `AppError::TaskNotFound` for a task this binary does not know
    /// - backend errors from `enqueue`
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<Job> {
        let default_queue = self
            .tasks
            .default_queue(&req.task)
            .ok_or_else(|| AppError::TaskNotFound(req.task.clone()))?;
        let queue = req.queue.unwrap_or_else(|| default_queue.clone());

        let job = Job::new(
            req.task,
            req.args,
            req.kwargs,
            queue.clone(),
            self.time_provider.now(),
        );

        let backend = self.backends.for_queue(&queue).await?;
        backend.enqueue(&job, &queue).await?;
        debug!(task = %job.task, queue = %queue, backend = backend.name(), "Enqueued job");
        Ok(job)
    }
}
