//! Retry policy for a single delivery call.
//!
//! The policy re-runs an async operation while it fails with a retryable
//! error, up to `max_attempts` calls in total. A gate can stop the sequence
//! early between attempts, which is how the circuit breaker cuts a retry
//! sequence short once it trips.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::backoff::exponential_delay;
use crate::DeliveryError;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        self.is_temporary()
    }
}

/// Why a retry sequence ended without success
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// The operation failed with an error that retrying cannot fix
    #[error("not retryable (attempt {attempts}): {error}")]
    Aborted { attempts: u32, error: E },

    /// The gate refused further attempts
    #[error("interrupted after {attempts} attempts: {last_error}")]
    Interrupted { attempts: u32, last_error: E },
}

impl<E> RetryError<E> {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Aborted { attempts, .. }
            | Self::Interrupted { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { last_error, .. } | Self::Interrupted { last_error, .. } => last_error,
            Self::Aborted { error, .. } => error,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            Self::Exhausted { last_error, .. } | Self::Interrupted { last_error, .. } => last_error,
            Self::Aborted { error, .. } => error,
        }
    }
}

/// A successful result and the number of calls it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total calls allowed, including the first.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts (milliseconds); `0` retries immediately.
    ///
    /// The actual delay is `base * 2^(attempt - 1)`.
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single delay (milliseconds).
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Delays are randomized within ±`jitter_factor`.
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    #[must_use]
    pub fn with_backoff(self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            ..self
        }
    }

    /// Effective attempt bound; a zero in configuration still allows one call.
    #[must_use]
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        exponential_delay(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
        )
    }

    /// Run `operation` until it succeeds or the policy gives up.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        E: Retryable,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_gated(|| true, operation)
            .await
            .map(|attempted| attempted.value)
    }

    /// Like [`Self::execute`], consulting `gate` before every re-attempt.
    ///
    /// An attempt already in flight always completes; the gate only prevents
    /// the next one from starting.
    pub async fn execute_gated<T, E, G, F, Fut>(
        &self,
        mut gate: G,
        mut operation: F,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        E: Retryable,
        G: FnMut() -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let limit = self.attempt_limit();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let last_error = match operation(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) if !error.is_retryable() => {
                    return Err(RetryError::Aborted {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => error,
            };

            if attempt >= limit {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error,
                });
            }

            let delay = self.delay_after(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if !gate() {
                return Err(RetryError::Interrupted {
                    attempts: attempt,
                    last_error,
                });
            }
        }
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        0
    }

    pub const fn max_delay_ms() -> u64 {
        10_000
    }

    pub const fn jitter_factor() -> f64 {
        0.1
    }
}
