//! Cancellable concurrency combinators for flaky long-running automation.
//!
//! Every combinator honors an optional [`CancellationToken`]; a token that
//! fires wins any race it participates in. None of these force-stop work
//! that has already started — they settle promptly and leave the underlying
//! operation to the caller.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod batch;
pub mod delay;
pub mod poll;
pub mod retry;
pub mod timeout;

pub use batch::{batch, BatchOptions};
pub use delay::delay;
pub use poll::{poll, PollOptions};
pub use retry::{retry, RetryOptions, RetryPredicate};
pub use timeout::{race_with_timeout, TimeoutOptions};
