//! Generic retry executor with exponential backoff.
//!
//! [`with_retry`] invokes a fallible async operation until it succeeds, runs
//! out of attempts, hits an error the classifier refuses to retry, or the
//! caller's [`Context`] is cancelled. Between attempts it sleeps for a delay
//! produced by a [`DelayCalculator`], and the sleep is always preemptible by
//! cancellation.
//!
//! Retried operations must be idempotent: nothing here undoes the side
//! effects of a failed attempt.
//!
//! ```no_run
//! use codex_retry::{Context, HttpError, RetryPolicy, with_retry};
//!
//! # async fn demo() {
//! let ctx = Context::new();
//! let result = with_retry(&ctx, &RetryPolicy::default(), "fetch-quote", |_ctx| async {
//!     Err::<u32, _>(HttpError::new(503, "unavailable"))
//! })
//! .await;
//! assert!(result.is_err());
//! # }
//! ```

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod backoff;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod policy;
pub mod strategy;

pub use backoff::{DelayCalculator, ExponentialBackoff};
pub use classifier::{is_retryable, is_retryable_error};
pub use error::{RetryError, RetryFailure};
pub use events::{RetryEvent, RetryEventSink, TracingEventSink};
pub use http::HttpError;
pub use policy::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, RetryPolicy};
pub use strategy::with_retry;

pub use codex_async_utils::{CancelErr, Context, OrCancelExt};
pub use tokio_util::sync::CancellationToken;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
