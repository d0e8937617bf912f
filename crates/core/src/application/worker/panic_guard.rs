// Panic isolation for worker safety: a panicking job must not kill the worker process
use crate::error::{AppError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Poll `future` to completion, turning a panic into `AppError::Panicked`
///
/// # Example
/// ```text
/// let result = guard_future(async { panic!("test panic") }).await;
/// assert!(matches!(result, Err(AppError::Panicked(_))));
/// ```
pub async fn guard_future<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let panic_msg = panic_message(payload.as_ref());
            error!(panic_msg = %panic_msg, "Job panicked");
            Err(AppError::Panicked(panic_msg))
        }
    }
}
