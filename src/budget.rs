// src/budget.rs
// =============================================================================
// Every call that leaves the process (content store, cache, storage) runs
// under two guards:
// - a timeout taken from the configured budget
// - the request's CancellationToken
//
// Both end up as ordinary `DocsError` values, so they flow through the same
// fallback and partial-failure paths as any other error.
// =============================================================================

use crate::error::{DocsError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs `operation` bounded by `budget` and cancellable through `cancel`.
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    budget: Duration,
    operation: &str,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DocsError::Cancelled),
        outcome = tokio::time::timeout(budget, future) => match outcome {
            Ok(result) => result,
            Err(_) => Err(DocsError::Timeout {
                operation: operation.to_string(),
                budget,
            }),
        },
    }
}
