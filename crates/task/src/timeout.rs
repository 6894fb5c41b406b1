//! Races an operation against a deadline and a cancellation token.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use webpilot_core::{Error, Result};

use crate::delay::delay;

/// Options for [`race_with_timeout`].
#[derive(Debug, Clone, Default)]
pub struct TimeoutOptions {
    /// Deadline in milliseconds.
    pub timeout_ms: u64,
    /// Optional caller-controlled cancellation; wins over the deadline.
    pub cancel: Option<CancellationToken>,
}

/// Runs `op` against `delay(timeout_ms, cancel)`, settling with whichever
/// finishes first. A token that has already fired at call time fails with
/// [`Error::Cancelled`] without starting the race.
///
/// If `op` wins, its result passes through unchanged. If the deadline wins,
/// `op` is dropped but any external work it started is not forcibly
/// stopped; cancelling that work remains the caller's job.
pub async fn race_with_timeout<T, F>(op: F, opts: TimeoutOptions) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Some(token) = &opts.cancel {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
    }
    tokio::select! {
        biased;
        result = op => result,
        err = delay(opts.timeout_ms, opts.cancel.as_ref()) => Err(err),
    }
}
