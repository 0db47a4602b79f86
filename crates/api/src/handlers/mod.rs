pub mod internal;
pub mod notification;
pub mod webhook;

use std::future::Future;

use crate::error::{AppError, AppResult};

/// Run `work` on its own task and wait for it.
///
/// Dropping the request (client disconnect) does not stop the task, so
/// claims are always released and webhook counters always recorded.
pub(crate) async fn run_detached<F>(work: F) -> AppResult<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::InternalError(format!("Invocation task failed: {e}")))
}
