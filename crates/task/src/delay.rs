//! Cancellation-aware delay, the waitable unit under every other combinator.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use webpilot_core::Error;

/// Waits `ms` milliseconds and yields the terminal condition for the wait:
/// [`Error::Timeout`] once the duration elapses, or [`Error::Cancelled`]
/// immediately if `cancel` fires first (or had already fired at entry).
///
/// The output *is* the condition, so race arms return it as their error and
/// backoff waits match on it directly. Exactly one outcome occurs; the
/// losing timer is dropped, never left running.
pub async fn delay(ms: u64, cancel: Option<&CancellationToken>) -> Error {
    match cancel {
        Some(token) => {
            if token.is_cancelled() {
                return Error::Cancelled;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => Error::Cancelled,
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                    Error::Timeout { timeout_ms: ms }
                }
            }
        }
        None => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Error::Timeout { timeout_ms: ms }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_delay_yields_timeout_after_duration() {
        let start = Instant::now();
        let err = delay(30, None).await;
        assert!(matches!(err, Error::Timeout { timeout_ms: 30 }));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_delay_cancelled_immediately_when_token_already_fired() {
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();
        let err = delay(10_000, Some(&token)).await;
        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_delay_cancelled_mid_wait() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        let err = delay(10_000, Some(&token)).await;
        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
