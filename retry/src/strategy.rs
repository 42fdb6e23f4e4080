//! Retry loop
//!
//! Runs an operation until it succeeds, the attempt budget is spent, the
//! classifier refuses a retry, or the caller's context finishes while we are
//! waiting between attempts.

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use codex_async_utils::{CancelErr, Context, OrCancelExt};

use crate::error::{RetryError, RetryFailure};
use crate::events::RetryEvent;
use crate::policy::RetryPolicy;

/// Execute `operation` with exponential backoff between failed attempts.
///
/// Each attempt receives a clone of `ctx`. On success the value is returned
/// as is. When attempts run out, or the policy's classifier rejects an
/// error, the last error is wrapped in a [`RetryFailure`] carrying the number
/// of attempts actually made. When `ctx` is cancelled (or its deadline
/// passes) during a backoff wait, the cancellation reason is returned
/// directly as [`RetryError::Cancelled`] and no further attempt is made.
///
/// The operation must be idempotent; failed attempts are not rolled back.
///
/// # Example
/// ```ignore
/// let ctx = Context::new().with_timeout(Duration::from_secs(30));
/// let policy = RetryPolicy::default().with_event_sink(TracingEventSink);
///
/// let body = with_retry(&ctx, &policy, "fetch-config", |ctx| async move {
///     fetch_config(&ctx).await
/// })
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut>(
    ctx: &Context,
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Error + 'static,
{
    let policy = policy.normalized();
    let max_attempts = policy.max_attempts;
    let mut attempt: u32 = 0;

    let last_error = loop {
        attempt = attempt.saturating_add(1);

        let err = match operation(ctx.clone()).await {
            Ok(value) => {
                if attempt > 1 {
                    policy.emit(RetryEvent::Succeeded {
                        operation: operation_name,
                        attempt,
                    });
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !policy.should_retry(&err) {
            policy.emit(RetryEvent::AbortedNonRetriable {
                operation: operation_name,
                attempt,
                error: &err,
            });
            break err;
        }

        policy.emit(RetryEvent::WillRetry {
            operation: operation_name,
            attempt,
            max_attempts,
            error: &err,
        });

        if attempt >= max_attempts {
            break err;
        }
        // Only the final error is reported; never hold one across the wait.
        drop(err);

        let delay = policy.delay_for(attempt);
        tracing::trace!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "waiting before next attempt"
        );

        if let Err(reason) = wait_with_cancel(ctx, delay).await {
            tracing::debug!(
                operation = operation_name,
                attempt,
                %reason,
                "retry wait interrupted"
            );
            return Err(RetryError::Cancelled(reason));
        }
    };

    Err(RetryFailure::new(operation_name, attempt, last_error).into())
}

/// Sleep for `duration` unless the context finishes first.
async fn wait_with_cancel(ctx: &Context, duration: Duration) -> Result<(), CancelErr> {
    if duration.is_zero() {
        return match ctx.err() {
            Some(reason) => Err(reason),
            None => Ok(()),
        };
    }

    tokio::time::sleep(duration).or_cancel(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RetryEvent;
    use crate::http::HttpError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_min_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
    }

    fn recording_policy(max_attempts: u32) -> (RetryPolicy, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let policy = fast_policy(max_attempts).with_event_sink(move |event: &RetryEvent<'_>| {
            events_clone
                .lock()
                .unwrap()
                .push(format!("{}@{}", event.name(), event.attempt()));
        });
        (policy, events)
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let (policy, events) = recording_policy(3);

        let result = with_retry(&Context::new(), &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok::<i32, HttpError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(events.lock().unwrap().is_empty(), "no events on first-try success");
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let (policy, events) = recording_policy(5);

        let result = with_retry(&Context::new(), &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst) + 1;
                if current < 2 {
                    Err(HttpError::new(503, "unavailable"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["retry_will_retry@1", "retry_succeeded@2"]
        );
    }

    #[tokio::test]
    async fn test_max_attempts() {
        for max_attempts in 1..=4 {
            let call_count = Arc::new(AtomicUsize::new(0));
            let call_count_clone = call_count.clone();
            let policy = fast_policy(max_attempts);

            let result = with_retry(&Context::new(), &policy, "op", move |_ctx| {
                let count = call_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HttpError::new(500, "boom"))
                }
            })
            .await;

            let failure = result
                .expect_err("always fails")
                .into_failure()
                .expect("exhaustion is wrapped");
            assert_eq!(failure.attempts(), max_attempts);
            assert_eq!(call_count.load(Ordering::SeqCst), max_attempts as usize);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_emits_will_retry_for_every_attempt() {
        let (policy, events) = recording_policy(3);

        let result = with_retry(&Context::new(), &policy, "op", |_ctx| async {
            Err::<(), _>(HttpError::new(503, "unavailable"))
        })
        .await;

        let failure = result
            .expect_err("always fails")
            .into_failure()
            .expect("exhaustion is wrapped");
        assert_eq!(failure.attempts(), 3);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "retry_will_retry@1",
                "retry_will_retry@2",
                "retry_will_retry@3"
            ]
        );
    }

    /// An error type that cannot cross threads.
    #[derive(Debug)]
    struct LocalError(std::rc::Rc<str>);

    impl std::fmt::Display for LocalError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "local: {}", self.0)
        }
    }

    impl Error for LocalError {}

    fn assert_send<F: Send>(_: &F) {}

    #[tokio::test]
    async fn test_error_not_held_across_backoff() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let policy = fast_policy(2).with_should_retry(|_| true);
        let ctx = Context::new();

        let retry = with_retry(&ctx, &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LocalError("offline".into()))
            }
        });
        assert_send(&retry);

        let failure = retry
            .await
            .expect_err("always fails")
            .into_failure()
            .expect("exhaustion is wrapped");
        assert_eq!(
            failure.to_string(),
            "operation 'op' failed after 2 attempts: local: offline"
        );
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let (policy, events) = recording_policy(5);

        let result = with_retry(&Context::new(), &policy, "lookup", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HttpError::new(404, "not found"))
            }
        })
        .await;

        let failure = result.unwrap_err().into_failure().unwrap();
        assert_eq!(failure.attempts(), 1);
        assert_eq!(failure.last_error().status_code, 404);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["retry_aborted_non_retriable@1"]
        );
    }

    #[tokio::test]
    async fn test_permanent_error_after_transient_ones() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let policy = fast_policy(5);

        let result = with_retry(&Context::new(), &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst) + 1;
                if current < 3 {
                    Err::<(), _>(HttpError::new(502, "bad gateway"))
                } else {
                    Err(HttpError::new(400, "bad request"))
                }
            }
        })
        .await;

        let failure = result.unwrap_err().into_failure().unwrap();
        assert_eq!(failure.attempts(), 3);
        assert_eq!(failure.last_error().status_code, 400);
    }

    #[tokio::test]
    async fn test_zero_fields_use_defaults() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let policy = fast_policy(0);

        let result = with_retry(&Context::new(), &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HttpError::new(503, "unavailable"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            call_count.load(Ordering::SeqCst),
            crate::policy::DEFAULT_MAX_ATTEMPTS as usize
        );
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let policy = fast_policy(3).with_should_retry(|_| true);

        let result = with_retry(&Context::new(), &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HttpError::new(404, "not found"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().as_failure().unwrap().attempts(), 3);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_during_wait() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let ctx = Context::new();
        let policy = RetryPolicy::default()
            .with_min_delay(Duration::from_secs(30))
            .with_max_delay(Duration::from_secs(30));

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let result = with_retry(&ctx, &policy, "op", move |_ctx| {
            let count = call_count_clone.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(HttpError::new(503, "unavailable"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.cancel_reason(), Some(CancelErr::Cancelled));
        assert!(err.as_failure().is_none());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_wait() {
        let ctx = Context::new().with_timeout(Duration::from_millis(50));
        let policy = RetryPolicy::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(1));

        let result = with_retry(&ctx, &policy, "op", |_ctx| async {
            Err::<(), _>(HttpError::new(503, "unavailable"))
        })
        .await;

        assert_eq!(
            result.unwrap_err().cancel_reason(),
            Some(CancelErr::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn test_zero_delay_still_observes_cancellation() {
        let ctx = Context::new();
        ctx.cancel();

        let result = wait_with_cancel(&ctx, Duration::ZERO).await;
        assert_eq!(result, Err(CancelErr::Cancelled));

        let result = wait_with_cancel(&Context::new(), Duration::ZERO).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_operation_receives_the_context() {
        let ctx = Context::new().with_timeout(Duration::from_secs(60));
        let expected = ctx.deadline();

        let result = with_retry(&ctx, &fast_policy(1), "op", move |op_ctx| async move {
            Ok::<_, HttpError>(op_ctx.deadline())
        })
        .await;

        assert_eq!(result.unwrap(), expected);
    }
}
