//! Retry policy configuration

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{DelayCalculator, ExponentialBackoff};
use crate::classifier::is_retryable;
use crate::events::{RetryEvent, RetryEventSink};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Predicate deciding whether an error deserves another attempt.
pub type ShouldRetryFn = dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync;

/// How [`with_retry`](crate::with_retry) retries.
///
/// Zero-valued numeric fields fall back to the defaults when an invocation
/// starts. `None` collaborators fall back to the built-in ones: the default
/// classifier, [`ExponentialBackoff`], and no events.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub min_delay: Duration,
    /// Upper bound for any delay. Values below `min_delay` collapse to it.
    pub max_delay: Duration,
    pub should_retry: Option<Arc<ShouldRetryFn>>,
    pub on_event: Option<Arc<dyn RetryEventSink>>,
    pub delay_calculator: Option<Arc<dyn DelayCalculator>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            should_retry: None,
            on_event: None,
            delay_calculator: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .field("should_retry", &self.should_retry.as_ref().map(|_| "custom"))
            .field("on_event", &self.on_event.is_some())
            .field(
                "delay_calculator",
                &self.delay_calculator.as_ref().map(|_| "custom"),
            )
            .finish()
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Replace the default classifier.
    pub fn with_should_retry<F>(mut self, should_retry: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(should_retry));
        self
    }

    pub fn with_event_sink<S>(mut self, sink: S) -> Self
    where
        S: RetryEventSink + 'static,
    {
        self.on_event = Some(Arc::new(sink));
        self
    }

    pub fn with_delay_calculator<D>(mut self, calculator: D) -> Self
    where
        D: DelayCalculator + 'static,
    {
        self.delay_calculator = Some(Arc::new(calculator));
        self
    }

    /// Copy of this policy with zero-valued numeric fields replaced by the
    /// defaults.
    pub fn normalized(&self) -> Self {
        let mut policy = self.clone();
        if policy.max_attempts == 0 {
            policy.max_attempts = DEFAULT_MAX_ATTEMPTS;
        }
        if policy.min_delay.is_zero() {
            policy.min_delay = DEFAULT_MIN_DELAY;
        }
        if policy.max_delay.is_zero() {
            policy.max_delay = DEFAULT_MAX_DELAY;
        }
        policy
    }

    pub(crate) fn should_retry(&self, err: &(dyn Error + 'static)) -> bool {
        match &self.should_retry {
            Some(should_retry) => should_retry(err),
            None => is_retryable(Some(err)),
        }
    }

    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match &self.delay_calculator {
            Some(calculator) => calculator.delay(attempt, self.min_delay, self.max_delay),
            None => ExponentialBackoff::default().delay(attempt, self.min_delay, self.max_delay),
        };
        // max < min collapses to min
        if self.max_delay < self.min_delay {
            self.min_delay
        } else {
            delay
        }
    }

    pub(crate) fn emit(&self, event: RetryEvent<'_>) {
        if let Some(sink) = &self.on_event {
            sink.on_event(&event);
        }
    }
}
