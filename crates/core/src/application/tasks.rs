// Task registry: task name -> task body and default queue

use super::queue_registry::QueueRegistry;
use crate::domain::QueueName;
use crate::error::{AppError, Result};
use crate::port::Task;
use std::collections::BTreeMap;
use std::sync::Arc;

struct RegisteredTask {
    task: Arc<dyn Task>,
    queue: QueueName,
}

/// Registry of the tasks this binary can run.
///
/// Populated at process startup, before queues are enumerated: every task's
/// default queue is an implied queue name.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name`, delivered on `queue` unless the producer overrides it
    pub fn register(
        &mut self,
        name: impl Into<String>,
        queue: QueueName,
        task: impl Task + 'static,
    ) -> Result<&mut Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(AppError::Validation("task name must not be empty".to_string()));
        }
        if self.tasks.contains_key(&name) {
            return Err(AppError::Registration(format!(
                "task '{}' is already registered",
                name
            )));
        }
        self.tasks.insert(
            name,
            RegisteredTask {
                task: Arc::new(task),
                queue,
            },
        );
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).map(|registered| registered.task.clone())
    }

    pub fn default_queue(&self, name: &str) -> Option<&QueueName> {
        self.tasks.get(name).map(|registered| &registered.queue)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Hand every task's default queue to the queue registry
    pub fn contribute_implied_queues(&self, queues: &mut QueueRegistry) -> Result<()> {
        for registered in self.tasks.values() {
            queues.contribute_implied_queue(registered.queue.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::NoopTask;

    fn queue(name: &str) -> QueueName {
        QueueName::new(name).unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut tasks = TaskRegistry::new();
        tasks.register("noop", queue("default"), NoopTask).unwrap();

        assert!(tasks.get("noop").is_some());
        assert!(tasks.get("missing").is_none());
        assert_eq!(tasks.default_queue("noop"), Some(&queue("default")));
        assert!(tasks.register("noop", queue("other"), NoopTask).is_err());
    }

    #[test]
    fn test_implied_queues_contributed() {
        let mut tasks = TaskRegistry::new();
        tasks
            .register("a", queue("thumbs"), NoopTask)
            .unwrap()
            .register("b", queue("emails"), NoopTask)
            .unwrap();

        let mut queues = QueueRegistry::from_counts([(queue("emails"), 3)]).unwrap();
        tasks.contribute_implied_queues(&mut queues).unwrap();
        let counts = queues.queue_counts();

        assert_eq!(counts.get(&queue("emails")), Some(3));
        assert_eq!(counts.get(&queue("thumbs")), Some(1));

        // Too late now
        assert!(tasks.contribute_implied_queues(&mut queues).is_err());
    }
}
