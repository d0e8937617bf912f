// lightq Infrastructure - SQLite Adapter
// Implements: Backend + Deduplicate, TransactionManager

mod backend;
mod connection;
mod error;
mod migration;
mod transaction;

pub use backend::{SqliteBackend, DEFAULT_MAX_DELIVERIES, SQLITE_BACKEND};
pub use connection::create_pool;
pub use migration::run_migrations;
pub use transaction::{connection, SqliteTransactionManager};

// sqlx::Error is converted through error::map_sqlx_error: the orphan rule
// forbids `impl From<sqlx::Error> for AppError` in this crate.
