//! Async utilities for cancellation-aware futures.
//!
//! Provides a cancellable execution [`Context`] (a `CancellationToken` plus an
//! optional deadline) and the `OrCancelExt` trait for racing any future
//! against it.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`Context`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelErr {
    /// The context's token was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellable execution context.
///
/// Cloning is cheap: clones share the same token, so cancelling one clone
/// cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token without a deadline.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context that also finishes at `deadline`.
    ///
    /// An earlier deadline already on `self` wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that finishes `timeout` from now.
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.clone(),
        }
    }

    /// Derive a context with a child token.
    ///
    /// Cancelling `self` cancels the child; cancelling the child leaves
    /// `self` untouched.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reason the context is finished, or `None` while it is still live.
    pub fn err(&self) -> Option<CancelErr> {
        if self.token.is_cancelled() {
            return Some(CancelErr::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CancelErr::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn done(&self) -> CancelErr {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => CancelErr::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelErr::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelErr::Cancelled
            }
        }
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Self::with_token(token)
    }
}

/// Extension trait for making futures cancellable.
///
/// Allows any future to race against a [`Context`], returning the context's
/// [`CancelErr`] if it finishes before the future completes.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the context.
    ///
    /// Returns `Ok(output)` if the future completes first, or `Err(reason)`
    /// if the context is cancelled or its deadline passes.
    async fn or_cancel(self, ctx: &Context) -> Result<Self::Output, CancelErr>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, ctx: &Context) -> Result<Self::Output, CancelErr> {
        tokio::select! {
            biased;
            reason = ctx.done() => Err(reason),
            res = self => Ok(res),
        }
    }
}
