// SQLite Backend Implementation
//
// Every process of a fleet opens the same database file. A job row is claimed
// by stamping it with the worker number of its queue; the stamp is cleared by
// deleting the row once the worker acknowledges the job.

use crate::error::map_sqlx_error;
use crate::{create_pool, run_migrations};
use async_trait::async_trait;
use lightq_core::application::worker::constants::BACKEND_POLL_INTERVAL;
use lightq_core::domain::{Job, QueueName, WorkerNumber};
use lightq_core::error::Result;
use lightq_core::port::{Backend, Deduplicate, DeduplicateOutcome, ProgressLogger};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

pub const SQLITE_BACKEND: &str = "sqlite";

/// Rows deleted per statement during deduplication
const DEDUPLICATE_BATCH: usize = 500;

/// Deliveries of one job before it is dropped as poison
pub const DEFAULT_MAX_DELIVERIES: u32 = 3;

pub struct SqliteBackend {
    pool: SqlitePool,
    poll_interval: Duration,
    max_deliveries: u32,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    payload: String,
    deliveries: i64,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            poll_interval: BACKEND_POLL_INTERVAL,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }

    /// Open (creating if needed) the database at `path` and bring its schema up to date
    pub async fn connect(path: &Path) -> Result<Self> {
        let pool = create_pool(path).await?;
        run_migrations(&pool).await?;
        info!(path = %path.display(), "SQLite backend ready");
        Ok(Self::new(pool))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// A job whose worker keeps dying on it is dropped after `max` deliveries
    pub fn with_max_deliveries(mut self, max: u32) -> Self {
        self.max_deliveries = max.max(1);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Take back a row this worker claimed but never acknowledged: its
    /// previous incarnation died while running it.
    async fn redeliver_orphan(
        &self,
        queue: &QueueName,
        worker_number: WorkerNumber,
    ) -> Result<Option<JobRow>> {
        sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE lightq_jobs
            SET deliveries = deliveries + 1
            WHERE id = (
                SELECT id FROM lightq_jobs
                WHERE queue = ? AND claimed_by = ?
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING id, payload, deliveries
            "#,
        )
        .bind(queue.as_str())
        .bind(i64::from(worker_number))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    /// Atomically claim the oldest unclaimed row of `queue`
    async fn claim_next(&self, queue: &QueueName, worker_number: WorkerNumber) -> Result<Option<JobRow>> {
        sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE lightq_jobs
            SET claimed_by = ?, deliveries = deliveries + 1
            WHERE id = (
                SELECT id FROM lightq_jobs
                WHERE queue = ? AND claimed_by IS NULL
                ORDER BY id ASC
                LIMIT 1
            )
            RETURNING id, payload, deliveries
            "#,
        )
        .bind(i64::from(worker_number))
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    /// Decode a claimed row. Undecodable rows and rows past the delivery
    /// limit are dropped so they cannot be redelivered forever.
    async fn decode(&self, row: JobRow) -> Result<Option<Job>> {
        if row.deliveries > i64::from(self.max_deliveries) {
            error!(
                id = row.id,
                deliveries = row.deliveries - 1,
                "Dropping job that never completed a delivery"
            );
            self.delete_row(row.id).await?;
            return Ok(None);
        }
        match Job::from_json(&row.payload) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                error!(id = row.id, error = %e, "Dropping undecodable job row");
                self.delete_row(row.id).await?;
                Ok(None)
            }
        }
    }

    async fn delete_row(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lightq_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        SQLITE_BACKEND
    }

    async fn startup(&self, queue: &QueueName) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!(queue = %queue, "SQLite backend reachable");
        Ok(())
    }

    async fn enqueue(&self, job: &Job, queue: &QueueName) -> Result<()> {
        let payload = job.to_json()?;

        sqlx::query(
            r#"
            INSERT INTO lightq_jobs (queue, task, identity, payload, enqueued_at, claimed_by)
            VALUES (?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(queue.as_str())
        .bind(&job.task)
        .bind(job.identity())
        .bind(&payload)
        .bind(job.enqueued_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn dequeue(
        &self,
        queue: &QueueName,
        worker_number: WorkerNumber,
        timeout: Duration,
    ) -> Result<Option<Job>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(row) = self.redeliver_orphan(queue, worker_number).await? {
                info!(
                    queue = %queue,
                    worker_number,
                    id = row.id,
                    deliveries = row.deliveries,
                    "Redelivering unacknowledged job"
                );
                if let Some(job) = self.decode(row).await? {
                    return Ok(Some(job));
                }
                continue;
            }

            if let Some(row) = self.claim_next(queue, worker_number).await? {
                if let Some(job) = self.decode(row).await? {
                    return Ok(Some(job));
                }
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn length(&self, queue: &QueueName) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lightq_jobs WHERE queue = ? AND claimed_by IS NULL",
        )
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }

    async fn processed_job(
        &self,
        queue: &QueueName,
        worker_number: WorkerNumber,
        _job: &Job,
    ) -> Result<()> {
        sqlx::query("DELETE FROM lightq_jobs WHERE queue = ? AND claimed_by = ?")
            .bind(queue.as_str())
            .bind(i64::from(worker_number))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn as_deduplicate(&self) -> Option<&dyn Deduplicate> {
        Some(self)
    }
}

#[async_trait]
impl Deduplicate for SqliteBackend {
    /// Keep the oldest waiting row of each identity, delete the later ones.
    /// Claimed rows are left alone.
    async fn deduplicate(
        &self,
        queue: &QueueName,
        progress: &dyn ProgressLogger,
    ) -> Result<DeduplicateOutcome> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, identity FROM lightq_jobs
            WHERE queue = ? AND claimed_by IS NULL
            ORDER BY id ASC
            "#,
        )
        .bind(queue.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let total = rows.len() as u64;
        progress.info(&format!("Scanning {} queued jobs on '{}'", total, queue));

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for (done, (id, identity)) in rows.into_iter().enumerate() {
            if !seen.insert(identity) {
                duplicates.push(id);
            }
            progress.progress(done as u64 + 1, total);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut removed = 0;
        for batch in duplicates.chunks(DEDUPLICATE_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(", ");
            let sql = format!(
                "DELETE FROM lightq_jobs WHERE claimed_by IS NULL AND id IN ({})",
                placeholders
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(*id);
            }
            removed += query
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        progress.info(&format!("Removed {} duplicate jobs from '{}'", removed, queue));
        Ok(DeduplicateOutcome {
            scanned: total,
            removed,
        })
    }
}
