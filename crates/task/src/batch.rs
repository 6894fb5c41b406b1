//! Bounded-concurrency batch processing with order-preserving results.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use webpilot_core::{Error, Result};

/// Options for [`batch`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Number of logical workers; clamped to `1..=items.len()`.
    pub concurrency: usize,
    /// Optional caller-controlled cancellation, checked before each index
    /// claim. Items already started are not interrupted.
    pub cancel: Option<CancellationToken>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cancel: None,
        }
    }
}

/// Applies `op` to every item with a fixed number of workers sharing one
/// claim cursor: each index is claimed exactly once, none is skipped, and
/// each result lands at its original index regardless of completion order.
///
/// Workers are independent; one failure does not stop the others. Failures
/// are collected with their index, and once every worker has drained the
/// batch settles all-or-nothing: any collected failure produces a single
/// [`Error::Batch`] naming every failing index, with no partial successes
/// returned. A fired cancellation token takes precedence over the
/// aggregate when any item was left unprocessed.
pub async fn batch<T, R, F, Fut>(items: Vec<T>, op: F, opts: BatchOptions) -> Result<Vec<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    let worker_count = opts.concurrency.clamp(1, total);

    let cursor = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<T>>> = items.into_iter().map(|item| Mutex::new(Some(item))).collect();
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..total).map(|_| None).collect());
    let failures: Mutex<Vec<(usize, Error)>> = Mutex::new(Vec::new());

    let workers = (0..worker_count).map(|_| {
        let cursor = &cursor;
        let slots = &slots;
        let results = &results;
        let failures = &failures;
        let op = &op;
        let cancel = opts.cancel.as_ref();
        async move {
            loop {
                if cancel.map_or(false, |token| token.is_cancelled()) {
                    break;
                }
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                if index >= total {
                    break;
                }
                let item = match slots[index].lock().await.take() {
                    Some(item) => item,
                    None => continue,
                };
                match op(item).await {
                    Ok(value) => {
                        results.lock().await[index] = Some(value);
                    }
                    Err(err) => {
                        debug!(index, error = %err, "batch item failed");
                        failures.lock().await.push((index, err));
                    }
                }
            }
        }
    });
    futures::future::join_all(workers).await;

    let cancelled = opts.cancel.as_ref().map_or(false, |token| token.is_cancelled());
    let mut failures = failures.into_inner();
    let results = results.into_inner();

    // Cancellation wins the overall outcome whenever it left work unclaimed.
    let unprocessed = results.iter().enumerate().any(|(index, slot)| {
        slot.is_none() && !failures.iter().any(|(failed, _)| *failed == index)
    });
    if cancelled && unprocessed {
        return Err(Error::Cancelled);
    }
    if !failures.is_empty() {
        failures.sort_by_key(|(index, _)| *index);
        return Err(Error::Batch { failures });
    }

    let mut output = Vec::with_capacity(total);
    for (index, slot) in results.into_iter().enumerate() {
        match slot {
            Some(value) => output.push(value),
            None => {
                return Err(Error::Other(format!("batch item {} produced no result", index)));
            }
        }
    }
    Ok(output)
}
