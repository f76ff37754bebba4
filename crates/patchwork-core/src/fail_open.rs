//! Fail-open utilities for auxiliary operations
//!
//! Some steps around a calculation are nice to have but must never fail the
//! job: submitting raw logs to the coordinator and removing a finished job's
//! scratch directory. Those run through [`fail_open`].
//!
//! DO NOT use fail-open for:
//! - Context fetching or result uploading
//! - Input materialization or packaging

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use patchwork_core::fail_open::fail_open;
/// use patchwork_core::Result;
///
/// async fn submit_logs() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let result = fail_open("log submission", || submit_logs()).await;
///     // result is None if submit_logs() failed, otherwise Some(())
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
