// Transaction middleware: the job body runs inside one transactional scope,
// committed on success and rolled back on failure. The task reaches the open
// scope through `current_transaction()`.

use crate::domain::Job;
use crate::error::{AppError, Result};
use crate::port::{Middleware, Next, Transaction, TransactionManager};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

type TransactionSlot = Arc<Mutex<Box<dyn Transaction>>>;

tokio::task_local! {
    static CURRENT: TransactionSlot;
}

/// Locked access to the transaction of the running job
pub struct CurrentTransaction(OwnedMutexGuard<Box<dyn Transaction>>);

impl CurrentTransaction {
    pub fn get_mut(&mut self) -> &mut dyn Transaction {
        &mut **self.0
    }
}

/// The scope opened for the job running on this task, if any.
///
/// Drop the returned guard before the task returns; a job still holding it
/// when it finishes fails and its transaction is dropped uncommitted.
pub async fn current_transaction() -> Option<CurrentTransaction> {
    let slot = CURRENT.try_with(Arc::clone).ok()?;
    Some(CurrentTransaction(slot.lock_owned().await))
}

pub struct TransactionMiddleware {
    manager: Arc<dyn TransactionManager>,
}

impl TransactionMiddleware {
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Middleware for TransactionMiddleware {
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn handle(&self, job: &Job, next: Next<'_>) -> Result<()> {
        let slot: TransactionSlot = Arc::new(Mutex::new(self.manager.begin().await?));

        let result = CURRENT.scope(slot.clone(), next.run(job)).await;
        let tx = Arc::try_unwrap(slot)
            .map_err(|_| {
                AppError::Middleware(format!(
                    "task '{}' kept its transaction past the end of the job",
                    job.task
                ))
            })?
            .into_inner();

        match result {
            Ok(()) => tx.commit().await,
            Err(e) => {
                // The job's error is the one worth reporting
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(task = %job.task, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}
