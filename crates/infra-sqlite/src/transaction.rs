// SQLite Transaction Implementation
// Scope opened by the transaction middleware around each job.

use crate::create_pool;
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use lightq_core::error::Result;
use lightq_core::port::{Transaction, TransactionManager};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction as SqlxTransaction};
use std::any::Any;
use std::path::PathBuf;
use tokio::sync::OnceCell;

pub struct SqliteTransactionManager {
    path: Option<PathBuf>,
    pool: OnceCell<SqlitePool>,
}

impl SqliteTransactionManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            path: None,
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    /// Connect to the database at `path` when the first transaction begins
    pub fn lazy(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                match &self.path {
                    Some(path) => create_pool(path).await,
                    None => Err(lightq_core::AppError::Internal(
                        "transaction manager has neither pool nor path".to_string(),
                    )),
                }
            })
            .await
    }
}

#[async_trait]
impl TransactionManager for SqliteTransactionManager {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool().await?.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

struct SqliteTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
}

/// Connection of a transaction opened by [`SqliteTransactionManager`].
///
/// Statements a task runs on it commit or roll back with the job:
///
/// ```ignore
/// if let Some(mut current) = current_transaction().await {
///     if let Some(conn) = connection(current.get_mut()) {
///         sqlx::query("INSERT INTO audit (job) VALUES (?)").bind(&job.task).execute(conn).await?;
///     }
/// }
/// ```
pub fn connection(tx: &mut dyn Transaction) -> Option<&mut SqliteConnection> {
    tx.as_any_mut()
        .downcast_mut::<SqliteTransaction>()
        .map(|sqlite| &mut *sqlite.tx)
}

#[async_trait]
impl Transaction for SqliteTransaction {
    fn as_any_mut(&mut self) -> &mut (dyn Any + Send) {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
