//! Retry engine with pluggable retryability and backoff selection.
//!
//! A [`RetryPolicy`] turns each failure of an operation into a
//! [`RetryDecision`]: give up with the error unchanged, give up because the
//! attempt ceiling was reached, or wait and try again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub mod backoff;

pub use backoff::{BackOff, ExponentialBackOff, FixedBackOff, Jitter};

/// Default ceiling on the number of retries
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Decides whether an error is worth retrying
pub type RetryablePredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Chooses the backoff strategy for an error
pub type BackOffSelector<E> = Arc<dyn Fn(&E) -> Arc<dyn BackOff> + Send + Sync>;

/// Outcome of classifying one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay
    Retry(Duration),
    /// The error is not retryable; surface it unchanged
    Permanent,
    /// The retry ceiling has been reached
    Exhausted,
}

/// Terminal failure of a retried operation
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error the policy does not retry
    Permanent(E),
    /// The operation kept failing until the retry ceiling was reached
    Exhausted {
        attempts: u32,
        max_attempts: u32,
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The error of the last attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(error) => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Permanent(error) => error.fmt(f),
            RetryError::Exhausted {
                attempts,
                max_attempts,
                ..
            } => write!(f, "Retries exhausted: {}/{}", attempts, max_attempts),
        }
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetryError::Permanent(error) => error.source(),
            RetryError::Exhausted { last, .. } => Some(last),
        }
    }
}

/// Configuration of the retry engine for one call site
pub struct RetryPolicy<E> {
    max_attempts: u32,
    retryable: RetryablePredicate<E>,
    backoff: BackOffSelector<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            retryable: Arc::clone(&self.retryable),
            backoff: Arc::clone(&self.backoff),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryPolicy<E> {
    /// Retry every error up to 10 times with a jittered fixed backoff
    pub fn new() -> Self {
        let backoff: Arc<dyn BackOff> =
            Arc::new(FixedBackOff::default().jitter(backoff::DEFAULT_JITTER_FACTOR));
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retryable: Arc::new(|_| true),
            backoff: Arc::new(move |_| Arc::clone(&backoff)),
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new().with_max_attempts(0)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Use the same backoff strategy for every error
    pub fn with_backoff<B>(mut self, backoff: B) -> Self
    where
        B: BackOff + 'static,
    {
        let backoff: Arc<dyn BackOff> = Arc::new(backoff);
        self.backoff = Arc::new(move |_| Arc::clone(&backoff));
        self
    }

    /// Choose the backoff strategy per error
    pub fn with_backoff_selector<S>(mut self, selector: S) -> Self
    where
        S: Fn(&E) -> Arc<dyn BackOff> + Send + Sync + 'static,
    {
        self.backoff = Arc::new(selector);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify the failure at zero-based `attempt`
    pub fn decide(&self, attempt: u32, error: &E) -> RetryDecision {
        if !(self.retryable)(error) {
            return RetryDecision::Permanent;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry((self.backoff)(error).next_backoff(attempt))
    }

    /// Run `operation` until it succeeds or the policy gives up
    pub async fn run<T, F, Fut>(&self, description: &str, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.decide(attempt, &error) {
                RetryDecision::Permanent => {
                    debug!(description, error = %error, "Attempt failed with non-retryable error");
                    return Err(RetryError::Permanent(error));
                },
                RetryDecision::Exhausted => {
                    warn!(
                        description,
                        attempts = attempt,
                        max_attempts = self.max_attempts,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        max_attempts: self.max_attempts,
                        last: error,
                    });
                },
                RetryDecision::Retry(delay) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        description,
                        error = %error,
                        "Attempt failed, retrying with backoff"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests;
