//! Backoff strategies: pure functions from attempt number to wait duration.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Default interval for fixed backoff and first delay for exponential backoff
pub const DEFAULT_FIRST_BACKOFF: Duration = Duration::from_millis(500);

/// Default growth factor for exponential backoff
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Default jitter factor
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Computes the wait before a retry, given the zero-based attempt index
pub trait BackOff: Send + Sync {
    fn next_backoff(&self, attempt: u32) -> Duration;

    /// Randomize every computed delay by up to `factor` in either direction
    fn jitter(self, factor: f64) -> Jitter<Self>
    where
        Self: Sized,
    {
        Jitter::new(self, factor)
    }
}

impl<B: BackOff + ?Sized> BackOff for Arc<B> {
    fn next_backoff(&self, attempt: u32) -> Duration {
        (**self).next_backoff(attempt)
    }
}

impl<B: BackOff + ?Sized> BackOff for Box<B> {
    fn next_backoff(&self, attempt: u32) -> Duration {
        (**self).next_backoff(attempt)
    }
}

/// Same delay for every attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedBackOff {
    interval: Duration,
}

impl FixedBackOff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedBackOff {
    fn default() -> Self {
        Self::new(DEFAULT_FIRST_BACKOFF)
    }
}

impl BackOff for FixedBackOff {
    fn next_backoff(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// `first * factor^attempt`, capped at `max`.
///
/// Saturating: any overflow yields `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackOff {
    first: Duration,
    factor: f64,
    max: Duration,
}

impl ExponentialBackOff {
    pub fn new(first: Duration, factor: f64, max: Duration) -> Self {
        Self { first, factor, max }
    }
}

impl Default for ExponentialBackOff {
    fn default() -> Self {
        Self::new(DEFAULT_FIRST_BACKOFF, DEFAULT_BACKOFF_FACTOR, Duration::MAX)
    }
}

impl BackOff for ExponentialBackOff {
    fn next_backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.first.as_nanos() as f64 * self.factor.powi(exponent);
        scale_nanos(nanos).map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Jitter decorator: multiplies the inner delay by a uniformly random
/// factor in `[1 - jitter, 1 + jitter]`, clamped to `[0, 2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter<B> {
    inner: B,
    min_factor: f64,
    max_factor: f64,
}

impl<B: BackOff> Jitter<B> {
    /// `factor` is clamped into `[0, 1]`
    pub fn new(inner: B, factor: f64) -> Self {
        let factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        Self {
            inner,
            min_factor: 1.0 - factor,
            max_factor: 1.0 + factor,
        }
    }

    /// Bounds of the random multiplier
    pub fn bounds(&self) -> (f64, f64) {
        (self.min_factor, self.max_factor)
    }
}

impl<B: BackOff> BackOff for Jitter<B> {
    fn next_backoff(&self, attempt: u32) -> Duration {
        let delay = self.inner.next_backoff(attempt);
        let multiplier = rand::rng()
            .random_range(self.min_factor..=self.max_factor)
            .clamp(0.0, 2.0);
        scale_nanos(delay.as_nanos() as f64 * multiplier).unwrap_or(delay)
    }
}

/// Fixed backoff
pub fn fixed(interval: Duration) -> FixedBackOff {
    FixedBackOff::new(interval)
}

/// Exponential backoff
pub fn exponential(first: Duration, factor: f64, max: Duration) -> ExponentialBackOff {
    ExponentialBackOff::new(first, factor, max)
}

/// Convert a nanosecond count to a Duration, or `None` if it does not fit
fn scale_nanos(nanos: f64) -> Option<Duration> {
    if nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64 {
        Some(Duration::from_nanos(nanos as u64))
    } else {
        None
    }
}
