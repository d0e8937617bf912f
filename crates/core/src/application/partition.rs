// Partitioner: which workers this machine runs
//
// Pure function of (counts, shard). Every machine enumerates all workers in the
// same order (queue name, then worker number) and keeps every machine_count-th
// one starting at its own offset, so no coordination is needed.

use super::queue_registry::QueueCounts;
use crate::domain::{MachineShard, QueueName, WorkerId};
use crate::error::{AppError, Result};

/// How the workers of this process are chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// This machine's share of the whole fleet
    Fleet(MachineShard),
    /// A single worker on one queue, run in the foreground (local debugging)
    OnlyQueue(QueueName),
}

/// All workers, in the fleet-wide enumeration order
pub fn all_workers(counts: &QueueCounts) -> Vec<WorkerId> {
    counts
        .iter()
        .flat_map(|(queue, count)| {
            (1..=count).map(move |number| WorkerId {
                queue: queue.clone(),
                number,
            })
        })
        .collect()
}

/// Workers owned by `shard`: the worker at enumeration index `i` (0-based)
/// belongs to machine `(i mod machine_count) + 1`.
pub fn owned_workers(counts: &QueueCounts, shard: MachineShard) -> Vec<WorkerId> {
    let count = shard.count() as usize;
    let offset = (shard.number() - 1) as usize;

    all_workers(counts)
        .into_iter()
        .enumerate()
        .filter(|(index, _)| index % count == offset)
        .map(|(_, worker)| worker)
        .collect()
}

/// Resolve a placement into the workers to run
pub fn plan(counts: &QueueCounts, placement: &Placement) -> Result<Vec<WorkerId>> {
    match placement {
        Placement::Fleet(shard) => Ok(owned_workers(counts, *shard)),
        Placement::OnlyQueue(queue) => {
            if !counts.contains(queue) {
                return Err(AppError::Config(format!(
                    "queue '{}' is not configured",
                    queue
                )));
            }
            Ok(vec![WorkerId {
                queue: queue.clone(),
                number: 1,
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::queue_registry::QueueRegistry;
    use std::collections::HashSet;

    fn counts(pairs: &[(&str, u32)]) -> QueueCounts {
        QueueRegistry::from_counts(
            pairs
                .iter()
                .map(|(name, count)| (QueueName::new(*name).unwrap(), *count)),
        )
        .unwrap()
        .queue_counts()
    }

    fn names(workers: &[WorkerId]) -> Vec<String> {
        workers.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_single_machine_owns_everything() {
        let counts = counts(&[("emails", 2)]);
        let owned = owned_workers(&counts, MachineShard::single());
        assert_eq!(names(&owned), vec!["emails/1", "emails/2"]);
    }

    #[test]
    fn test_pinned_enumeration_order() {
        // Changing this order breaks fleets running mixed versions
        let counts = counts(&[("b", 1), ("a", 2)]);
        assert_eq!(
            names(&owned_workers(&counts, MachineShard::new(1, 2).unwrap())),
            vec!["a/1", "b/1"]
        );
        assert_eq!(
            names(&owned_workers(&counts, MachineShard::new(2, 2).unwrap())),
            vec!["a/2"]
        );
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let counts = counts(&[("emails", 3), ("reports", 1), ("search", 5), ("thumbs", 2)]);
        let everything: HashSet<_> = all_workers(&counts).into_iter().collect();
        assert_eq!(everything.len() as u64, counts.total_workers());

        for machine_count in 1..=12 {
            let mut seen = HashSet::new();
            for machine in 1..=machine_count {
                let shard = MachineShard::new(machine, machine_count).unwrap();
                for worker in owned_workers(&counts, shard) {
                    assert!(seen.insert(worker), "worker owned twice");
                }
            }
            assert_eq!(seen, everything, "machine_count={}", machine_count);
        }
    }

    #[test]
    fn test_partition_is_deterministic() {
        let a = counts(&[("x", 4), ("y", 3)]);
        let b = counts(&[("y", 3), ("x", 4)]);
        let shard = MachineShard::new(2, 3).unwrap();
        assert_eq!(owned_workers(&a, shard), owned_workers(&b, shard));
    }

    #[test]
    fn test_more_machines_than_workers() {
        let counts = counts(&[("emails", 1)]);
        assert_eq!(
            owned_workers(&counts, MachineShard::new(1, 3).unwrap()).len(),
            1
        );
        assert!(owned_workers(&counts, MachineShard::new(3, 3).unwrap()).is_empty());
    }

    #[test]
    fn test_only_queue_placement() {
        let counts = counts(&[("emails", 4), ("reports", 2)]);
        let queue = QueueName::new("reports").unwrap();
        let workers = plan(&counts, &Placement::OnlyQueue(queue)).unwrap();
        assert_eq!(names(&workers), vec!["reports/1"]);

        let missing = QueueName::new("missing").unwrap();
        assert!(plan(&counts, &Placement::OnlyQueue(missing)).is_err());
    }
}
