// sqlx::Error -> AppError

use lightq_core::error::AppError;

/// Convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "5" | "517" => AppError::Backend(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Backend(format!("Database full: {}", db_err.message())),
                "2067" | "1555" => AppError::Backend(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                other => AppError::Backend(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => AppError::Backend(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::Backend("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Backend(format!("Column not found: {}", col))
        }
        sqlx::Error::PoolTimedOut => {
            AppError::Backend("Timed out waiting for a database connection".to_string())
        }
        // Connection, pool, protocol errors
        _ => AppError::Backend(err.to_string()),
    }
}
