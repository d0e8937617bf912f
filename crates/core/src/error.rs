// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Queue registration attempted after the worker counts were frozen.
    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    /// An optional backend capability was requested from a backend lacking it.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Middleware error: {0}")]
    Middleware(String),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Shorthand used by task implementations to report a failure.
    pub fn task(message: impl Into<String>) -> Self {
        AppError::Task(message.into())
    }
}
