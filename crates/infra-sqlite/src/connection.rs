// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use lightq_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Concurrent connections per process. A worker process holds at most one at a time.
const MAX_CONNECTIONS: u32 = 4;

/// Create a SQLite connection pool with WAL mode.
///
/// Many processes open the same file; the busy timeout makes writers wait for
/// each other instead of failing immediately.
pub async fn create_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}
