//! Delay calculation between attempts

use backon::{BackoffBuilder, ExponentialBuilder};
use std::time::Duration;

/// Computes how long to wait after a failed attempt.
///
/// `attempt` is the 1-based index of the attempt that just failed.
/// Implementations should stay within `[min, max]`; when `max < min` the
/// caller expects `min`.
pub trait DelayCalculator: Send + Sync {
    fn delay(&self, attempt: u32, min: Duration, max: Duration) -> Duration;
}

impl<F> DelayCalculator for F
where
    F: Fn(u32, Duration, Duration) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32, min: Duration, max: Duration) -> Duration {
        self(attempt, min, max)
    }
}

/// Exponential backoff: `min`, `min * factor`, `min * factor^2`, ... capped
/// at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub factor: f32,
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            factor: 2.0,
            jitter: false,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = factor;
        self
    }

    /// Randomize each delay (still clamped to the bounds).
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl DelayCalculator for ExponentialBackoff {
    fn delay(&self, attempt: u32, min: Duration, max: Duration) -> Duration {
        let max = max.max(min);
        let attempt = attempt.max(1) as usize;

        let mut builder = ExponentialBuilder::default()
            .with_min_delay(min)
            .with_max_delay(max)
            .with_factor(self.factor)
            .with_max_times(attempt);
        if self.jitter {
            builder = builder.with_jitter();
        }

        builder
            .build()
            .nth(attempt - 1)
            .unwrap_or(max)
            .clamp(min, max)
    }
}
