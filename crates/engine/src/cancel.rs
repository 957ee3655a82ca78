//! Cancellation helpers.
//!
//! Every external await in the engine is raced against the caller's
//! [`CancellationToken`]. Losing the race drops the in-flight future, which
//! releases the underlying request.

use std::future::Future;

use ragloom_core::error::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `token` is cancelled first.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;

        _ = token.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}
