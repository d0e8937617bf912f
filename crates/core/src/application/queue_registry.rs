// Queue worker-count registry
//
// Mutable while the process is being set up, frozen into an immutable snapshot
// the first time anything reads the counts. Every machine of a fleet computes
// its partition from that snapshot, so a queue appearing afterwards would make
// machines disagree; registering one is therefore an error, not a no-op.

use crate::domain::{QueueName, WorkerNumber};
use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::debug;

/// Immutable queue → worker count mapping, ordered by queue name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts(Arc<BTreeMap<QueueName, u32>>);

impl QueueCounts {
    pub fn get(&self, queue: &QueueName) -> Option<u32> {
        self.0.get(queue).copied()
    }

    pub fn contains(&self, queue: &QueueName) -> bool {
        self.0.contains_key(queue)
    }

    /// Queues with their counts, in lexical queue order
    pub fn iter(&self) -> impl Iterator<Item = (&QueueName, u32)> {
        self.0.iter().map(|(queue, count)| (queue, *count))
    }

    pub fn queues(&self) -> impl Iterator<Item = &QueueName> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_workers(&self) -> u64 {
        self.0.values().map(|count| u64::from(*count)).sum()
    }

    pub fn worker_numbers(&self, queue: &QueueName) -> Result<RangeInclusive<WorkerNumber>> {
        let count = self
            .get(queue)
            .ok_or_else(|| AppError::Config(format!("queue '{}' is not configured", queue)))?;
        Ok(1..=count)
    }
}

/// Builder for [`QueueCounts`]
#[derive(Debug, Default)]
pub struct QueueRegistry {
    workers: BTreeMap<QueueName, u32>,
    frozen: Option<QueueCounts>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from configured worker counts
    pub fn from_counts(counts: impl IntoIterator<Item = (QueueName, u32)>) -> Result<Self> {
        let mut registry = Self::new();
        for (queue, count) in counts {
            registry.set_workers(queue, count)?;
        }
        Ok(registry)
    }

    /// Explicitly configure the number of workers for `queue`
    pub fn set_workers(&mut self, queue: QueueName, count: u32) -> Result<()> {
        self.ensure_accepting(&queue)?;
        if count == 0 {
            return Err(AppError::Config(format!(
                "queue '{}' must have at least one worker",
                queue
            )));
        }
        self.workers.insert(queue, count);
        Ok(())
    }

    /// Make sure `queue` has workers, defaulting to one if it was not configured.
    ///
    /// Must be called during setup, before the counts are first read.
    pub fn contribute_implied_queue(&mut self, queue: QueueName) -> Result<()> {
        self.ensure_accepting(&queue)?;
        if !self.workers.contains_key(&queue) {
            debug!(queue = %queue, "Adding implied queue with one worker");
            self.workers.insert(queue, 1);
        }
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Read the counts, refusing any further registration from now on
    pub fn queue_counts(&mut self) -> QueueCounts {
        self.frozen
            .get_or_insert_with(|| QueueCounts(Arc::new(self.workers.clone())))
            .clone()
    }

    pub fn worker_numbers(&mut self, queue: &QueueName) -> Result<RangeInclusive<WorkerNumber>> {
        self.queue_counts().worker_numbers(queue)
    }

    fn ensure_accepting(&self, queue: &QueueName) -> Result<()> {
        if self.is_frozen() {
            return Err(AppError::Registration(format!(
                "queues have already been enumerated; register '{}' during setup",
                queue
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn queue(name: &str) -> QueueName {
        QueueName::new(name).unwrap()
    }

    #[test]
    fn test_implied_queue_reflected_before_freeze() {
        let mut registry = QueueRegistry::from_counts([(queue("emails"), 2)]).unwrap();
        registry.contribute_implied_queue(queue("reports")).unwrap();
        // Configured counts win over the implied default
        registry.contribute_implied_queue(queue("emails")).unwrap();

        let counts = registry.queue_counts();
        assert_eq!(counts.get(&queue("emails")), Some(2));
        assert_eq!(counts.get(&queue("reports")), Some(1));
        assert_eq!(counts.total_workers(), 3);
    }

    #[test]
    fn test_registration_after_read_fails() {
        let mut registry = QueueRegistry::new();
        registry.contribute_implied_queue(queue("emails")).unwrap();
        let counts = registry.queue_counts();

        let err = assert_err!(registry.contribute_implied_queue(queue("late")));
        assert!(matches!(err, AppError::Registration(_)));
        assert_err!(registry.set_workers(queue("late"), 3));

        // Snapshot unchanged
        assert_eq!(registry.queue_counts(), counts);
        assert!(!counts.contains(&queue("late")));
    }

    #[test]
    fn test_worker_numbers_freezes() {
        let mut registry = QueueRegistry::from_counts([(queue("emails"), 3)]).unwrap();
        let numbers: Vec<_> = registry.worker_numbers(&queue("emails")).unwrap().collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(registry.is_frozen());
        assert!(registry.worker_numbers(&queue("missing")).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert_err!(QueueRegistry::from_counts([(queue("emails"), 0)]));
    }

    #[test]
    fn test_iteration_is_lexical() {
        let mut registry =
            QueueRegistry::from_counts([(queue("b"), 1), (queue("a"), 1), (queue("B"), 1)])
                .unwrap();
        let names: Vec<_> = registry
            .queue_counts()
            .queues()
            .map(|q| q.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["B", "a", "b"]);
    }
}
