//! Fixed-interval condition polling with a hard deadline.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use webpilot_core::{Error, Result};

use crate::delay::delay;

/// Options for [`poll`].
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Pause between predicate evaluations, in milliseconds.
    pub interval_ms: u64,
    /// Overall budget, in milliseconds.
    pub timeout_ms: u64,
    /// Optional caller-controlled cancellation, re-checked every iteration.
    pub cancel: Option<CancellationToken>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            timeout_ms: 30_000,
            cancel: None,
        }
    }
}

/// Evaluates `predicate` until it returns true, waiting
/// `min(interval, remaining budget)` between evaluations.
///
/// A bounded iterative loop, so stack depth stays constant no matter how
/// long the poll runs. Exceeding the budget fails with
/// [`Error::PollTimeout`] carrying it; a predicate error propagates
/// immediately rather than being retried until the deadline.
pub async fn poll<F, Fut>(mut predicate: F, opts: PollOptions) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + Duration::from_millis(opts.timeout_ms);
    loop {
        if let Some(token) = &opts.cancel {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
        if predicate().await? {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::PollTimeout {
                timeout_ms: opts.timeout_ms,
            });
        }
        let remaining = deadline - now;
        let wait = remaining.min(Duration::from_millis(opts.interval_ms));
        if let Error::Cancelled = delay(wait.as_millis() as u64, opts.cancel.as_ref()).await {
            return Err(Error::Cancelled);
        }
    }
}
