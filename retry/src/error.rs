//! Terminal errors returned by [`with_retry`](crate::with_retry).

use codex_async_utils::CancelErr;

/// Every error `with_retry` can hand back.
///
/// Cancellation is reported verbatim so callers can tell "stopped waiting"
/// apart from "gave up retrying".
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The context was cancelled or hit its deadline between attempts.
    #[error(transparent)]
    Cancelled(#[from] CancelErr),

    /// Attempts ran out, or the classifier refused to retry.
    #[error(transparent)]
    Failed(RetryFailure<E>),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled(_))
    }

    pub fn cancel_reason(&self) -> Option<CancelErr> {
        match self {
            RetryError::Cancelled(reason) => Some(*reason),
            RetryError::Failed(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&RetryFailure<E>> {
        match self {
            RetryError::Failed(failure) => Some(failure),
            RetryError::Cancelled(_) => None,
        }
    }

    pub fn into_failure(self) -> Option<RetryFailure<E>> {
        match self {
            RetryError::Failed(failure) => Some(failure),
            RetryError::Cancelled(_) => None,
        }
    }
}

impl<E> From<RetryFailure<E>> for RetryError<E> {
    fn from(failure: RetryFailure<E>) -> Self {
        RetryError::Failed(failure)
    }
}

/// Failure envelope: the operation gave up after `attempts` tries.
///
/// `source()` is the last error the operation returned, so the root cause is
/// still reachable by walking the error chain.
#[derive(Debug, thiserror::Error)]
#[error("operation '{operation}' failed after {attempts} attempts: {last_error}")]
pub struct RetryFailure<E> {
    operation: String,
    attempts: u32,
    #[source]
    last_error: E,
}

impl<E> RetryFailure<E> {
    pub fn new(operation: impl Into<String>, attempts: u32, last_error: E) -> Self {
        Self {
            operation: operation.into(),
            attempts,
            last_error,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> &E {
        &self.last_error
    }

    pub fn into_last_error(self) -> E {
        self.last_error
    }
}
