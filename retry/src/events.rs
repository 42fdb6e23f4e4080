//! Diagnostic events emitted from the retry loop
//!
//! Events are delivered synchronously, one call per event, from inside
//! [`with_retry`](crate::with_retry). Nothing is emitted when the first
//! attempt succeeds.

use std::error::Error;

/// One observable step of a retry invocation.
#[derive(Debug, Clone, Copy)]
pub enum RetryEvent<'a> {
    /// A later attempt succeeded after at least one failure.
    Succeeded { operation: &'a str, attempt: u32 },

    /// An attempt failed with a retryable error.
    WillRetry {
        operation: &'a str,
        attempt: u32,
        max_attempts: u32,
        error: &'a (dyn Error + 'static),
    },

    /// An attempt failed with an error the classifier refused to retry.
    AbortedNonRetriable {
        operation: &'a str,
        attempt: u32,
        error: &'a (dyn Error + 'static),
    },
}

impl RetryEvent<'_> {
    /// Stable event name, suitable for log keys or metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            RetryEvent::Succeeded { .. } => "retry_succeeded",
            RetryEvent::WillRetry { .. } => "retry_will_retry",
            RetryEvent::AbortedNonRetriable { .. } => "retry_aborted_non_retriable",
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            RetryEvent::Succeeded { operation, .. }
            | RetryEvent::WillRetry { operation, .. }
            | RetryEvent::AbortedNonRetriable { operation, .. } => operation,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            RetryEvent::Succeeded { attempt, .. }
            | RetryEvent::WillRetry { attempt, .. }
            | RetryEvent::AbortedNonRetriable { attempt, .. } => *attempt,
        }
    }
}

/// Receives [`RetryEvent`]s.
///
/// Shared across concurrent invocations, so implementations must be safe to
/// call from several tasks at once.
pub trait RetryEventSink: Send + Sync {
    fn on_event(&self, event: &RetryEvent<'_>);
}

impl<F> RetryEventSink for F
where
    F: Fn(&RetryEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RetryEvent<'_>) {
        self(event)
    }
}

/// Sink that writes every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl RetryEventSink for TracingEventSink {
    fn on_event(&self, event: &RetryEvent<'_>) {
        match *event {
            RetryEvent::Succeeded { operation, attempt } => {
                tracing::info!(
                    event = event.name(),
                    operation,
                    attempt,
                    "operation succeeded after retry"
                );
            }
            RetryEvent::WillRetry {
                operation,
                attempt,
                max_attempts,
                error,
            } => {
                tracing::error!(
                    event = event.name(),
                    operation,
                    attempt,
                    max_attempts,
                    error = %error,
                    "operation failed, will retry"
                );
            }
            RetryEvent::AbortedNonRetriable {
                operation,
                attempt,
                error,
            } => {
                tracing::warn!(
                    event = event.name(),
                    operation,
                    attempt,
                    error = %error,
                    "retry aborted due to non-retriable error"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpError;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[test]
    fn event_accessors() {
        let err = HttpError::new(503, "unavailable");
        let event = RetryEvent::WillRetry {
            operation: "sync",
            attempt: 2,
            max_attempts: 3,
            error: &err,
        };
        assert_eq!(event.name(), "retry_will_retry");
        assert_eq!(event.operation(), "sync");
        assert_eq!(event.attempt(), 2);

        let event = RetryEvent::Succeeded {
            operation: "sync",
            attempt: 3,
        };
        assert_eq!(event.name(), "retry_succeeded");
    }

    #[test]
    fn closures_receive_events() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &RetryEvent<'_>| {
            seen.lock().unwrap().push(event.name());
        };

        let err = HttpError::new(404, "missing");
        sink.on_event(&RetryEvent::AbortedNonRetriable {
            operation: "lookup",
            attempt: 1,
            error: &err,
        });

        assert_eq!(*seen.lock().unwrap(), vec!["retry_aborted_non_retriable"]);
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        let err = HttpError::new(500, "boom");
        let sink = TracingEventSink;
        sink.on_event(&RetryEvent::WillRetry {
            operation: "op",
            attempt: 1,
            max_attempts: 2,
            error: &err,
        });
        sink.on_event(&RetryEvent::AbortedNonRetriable {
            operation: "op",
            attempt: 2,
            error: &err,
        });
        sink.on_event(&RetryEvent::Succeeded {
            operation: "op",
            attempt: 2,
        });
    }
}
