//! Bounded retry with a constant delay for transient storage failures.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Classification hook for errors that may succeed on a later attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Error returned once an operation gives up.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    #[error("{operation} failed: {source}")]
    Permanent {
        operation: String,
        #[source]
        source: E,
    },

    #[error("{operation} cancelled after {attempts} attempt(s)")]
    Cancelled { operation: String, attempts: u32 },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn operation(&self) -> &str {
        match self {
            RetryError::Exhausted { operation, .. }
            | RetryError::Permanent { operation, .. }
            | RetryError::Cancelled { operation, .. } => operation,
        }
    }
}

/// How many times to run an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// The delay between attempts is constant. Cancellation is honoured both
    /// while the operation is in flight and while waiting to retry.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: impl fmt::Display,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + Transient + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let operation = operation.to_string();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { operation, attempts: attempt - 1 });
                }
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                error!("{} failed with a non-retryable error: {}", operation, err);
                return Err(RetryError::Permanent {
                    operation,
                    source: err,
                });
            }

            if attempt >= self.max_attempts {
                error!("{} failed after {} attempts: {}", operation, attempt, err);
                return Err(RetryError::Exhausted {
                    operation,
                    attempts: attempt,
                    source: err,
                });
            }

            warn!(
                "{} failed on attempt {}/{}: {}",
                operation, attempt, self.max_attempts, err
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { operation, attempts: attempt });
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}
