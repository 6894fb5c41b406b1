//! Retry with exponential backoff, bounded by attempts and a predicate.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use webpilot_core::{Error, Result};

use crate::delay::delay;

/// Decides whether a given failure is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Options for [`retry`].
#[derive(Clone)]
pub struct RetryOptions {
    /// Maximum attempts including the first; clamped to at least 1.
    pub max_attempts: u32,
    /// Delay before the first re-attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay between attempts, never after the
    /// final one.
    pub backoff_factor: f64,
    /// Optional caller-controlled cancellation, honored before each attempt
    /// and during each backoff wait.
    pub cancel: Option<CancellationToken>,
    /// Retry filter; `None` retries every failure.
    pub retry_if: Option<RetryPredicate>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            backoff_factor: 2.0,
            cancel: None,
            retry_if: None,
        }
    }
}

/// Attempts `op` up to `max_attempts` times, waiting a growing, cancellable
/// delay between failures.
///
/// Returns the first success, or the failure of the last attempt made. A
/// token that has already fired at entry fails with [`Error::Cancelled`]
/// without attempting `op` at all. Implemented as a bounded iterative loop;
/// attempt state never outlives the call.
pub async fn retry<T, F, Fut>(mut op: F, opts: RetryOptions) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(token) = &opts.cancel {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
    }

    let max_attempts = opts.max_attempts.max(1);
    let mut delay_ms = opts.initial_delay_ms as f64;
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = opts.retry_if.as_ref().map_or(true, |pred| pred(&err));
                if attempt >= max_attempts || !retryable {
                    return Err(err);
                }
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay_ms as u64,
                    error = %err,
                    "attempt failed, retrying after backoff"
                );
                if let Error::Cancelled = delay(delay_ms as u64, opts.cancel.as_ref()).await {
                    return Err(Error::Cancelled);
                }
                delay_ms *= opts.backoff_factor;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    fn counting_op(
        calls: Arc<AtomicU32>,
        fail_first: u32,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= fail_first {
                    Err(Error::Other(format!("failure {}", n)))
                } else {
                    Ok(n)
                }
            })
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(counting_op(calls.clone(), 0), RetryOptions::default()).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();
        let result = retry(
            counting_op(calls.clone(), 2),
            RetryOptions {
                max_attempts: 3,
                initial_delay_ms: 20,
                backoff_factor: 2.0,
                ..Default::default()
            },
        )
        .await;
        // 20ms + 40ms of backoff before the third, successful attempt.
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(55), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_last_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(
            counting_op(calls.clone(), 10),
            RetryOptions {
                max_attempts: 3,
                initial_delay_ms: 1,
                ..Default::default()
            },
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::Other(msg)) => assert_eq!(msg, "failure 3"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_never_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(
            counting_op(calls.clone(), 10),
            RetryOptions {
                max_attempts: 1,
                ..Default::default()
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_predicate_stops_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(
            counting_op(calls.clone(), 10),
            RetryOptions {
                max_attempts: 5,
                initial_delay_ms: 1,
                retry_if: Some(Arc::new(|err| {
                    !matches!(err, Error::Other(_))
                })),
                ..Default::default()
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_the_operation() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(
            counting_op(calls.clone(), 0),
            RetryOptions {
                cancel: Some(token),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry(
            counting_op(calls.clone(), 10),
            RetryOptions {
                max_attempts: 3,
                initial_delay_ms: 10_000,
                cancel: Some(token),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
