//! Breaker-gated, retried delivery of a single message.
//!
//! ```text
//! dispatch ─> breaker permit? ──no──> log "circuit open" ─> Skipped
//!                  │
//!                 yes
//!                  v
//!          RetryPolicy ─> transport.send (bounded by send_timeout)
//!                  │
//!        ┌─────────┴─────────┐
//!     success             failure
//!  record_success      record_failure
//!  log succeeded       log failed
//!    Succeeded            Failed
//! ```
//!
//! Every call to [`Dispatcher::dispatch`] writes exactly one attempt log
//! entry. Store problems are logged and never change the outcome.

use std::{sync::Arc, time::Duration};

use herald_common::{DeliveryAttemptLog, Message, audit, outbound, tracing};
use tokio::time::Instant;

use crate::{
    DeliveryConfig, DeliveryError,
    circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry},
    error::TemporaryError,
    policy::{Attempted, RetryPolicy},
    store::AttemptStore,
    transport::EmailTransport,
};

/// Final result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The provider accepted the message
    Succeeded { attempts: u32 },
    /// Every permitted attempt failed; `reason` is the last error
    Failed { reason: String, attempts: u32 },
    /// The breaker was open and no send was made
    Skipped,
}

impl DeliveryOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts } | Self::Failed { attempts, .. } => *attempts,
            Self::Skipped => 0,
        }
    }
}

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<dyn EmailTransport>,
    breaker: Arc<CircuitBreaker>,
    store: Arc<dyn AttemptStore>,
    retry: RetryPolicy,
    send_timeout: Duration,
    store_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        breaker: Arc<CircuitBreaker>,
        store: Arc<dyn AttemptStore>,
    ) -> Self {
        Self {
            transport,
            breaker,
            store,
            retry: RetryPolicy::default(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Build the transport, store and breaker described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the transport cannot be constructed.
    pub fn from_config(
        config: DeliveryConfig,
        breakers: &CircuitBreakerRegistry,
    ) -> Result<Self, DeliveryError> {
        let send_timeout = config.send_timeout();
        let store_timeout = config.store_timeout();

        Ok(Self::new(
            config.transport.into_transport()?,
            breakers.get(&config.breaker),
            config.store.into_store(),
        )
        .with_retry_policy(config.retry)
        .with_send_timeout(send_timeout)
        .with_store_timeout(store_timeout))
    }

    #[must_use]
    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        Self { retry, ..self }
    }

    #[must_use]
    pub fn with_send_timeout(self, send_timeout: Duration) -> Self {
        Self {
            send_timeout,
            ..self
        }
    }

    #[must_use]
    pub fn with_store_timeout(self, store_timeout: Duration) -> Self {
        Self {
            store_timeout,
            ..self
        }
    }

    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    #[must_use]
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Deliver `message`, recording exactly one attempt log entry.
    pub async fn dispatch(&self, message: &Message) -> DeliveryOutcome {
        let transport = self.transport.name();

        let Some(permit) = self.breaker.try_acquire() else {
            audit::log_delivery_skipped(
                message.correlation_id(),
                message.recipient(),
                self.breaker.name(),
            );
            self.persist(DeliveryAttemptLog::circuit_open(message, transport))
                .await;
            return DeliveryOutcome::Skipped;
        };

        let started = Instant::now();
        let result = self
            .retry
            .execute_gated(
                || !self.breaker.is_open(),
                |attempt| self.attempt(message, attempt),
            )
            .await;

        match result {
            Ok(Attempted { attempts, .. }) => {
                permit.record_success();
                audit::log_delivery_success(
                    message.correlation_id(),
                    message.recipient(),
                    transport,
                    attempts,
                    started.elapsed().as_millis(),
                );
                self.persist(DeliveryAttemptLog::success(message, transport, attempts))
                    .await;
                DeliveryOutcome::Succeeded { attempts }
            }
            Err(error) => {
                permit.record_failure();
                let attempts = error.attempts();
                let reason = error.into_last_error().to_string();
                audit::log_delivery_failure(
                    message.correlation_id(),
                    message.recipient(),
                    &reason,
                    attempts,
                );
                self.persist(DeliveryAttemptLog::failure(
                    message, transport, attempts, &reason,
                ))
                .await;
                DeliveryOutcome::Failed { reason, attempts }
            }
        }
    }

    async fn attempt(&self, message: &Message, attempt: u32) -> Result<(), DeliveryError> {
        audit::log_dispatch_attempt(
            message.correlation_id(),
            message.recipient(),
            self.transport.name(),
            attempt,
        );

        let result = tokio::time::timeout(self.send_timeout, self.transport.send(message))
            .await
            .unwrap_or_else(|_| {
                Err(TemporaryError::Timeout(format!(
                    "send did not complete within {}ms",
                    self.send_timeout.as_millis()
                ))
                .into())
            });

        if let Err(error) = &result {
            outbound!(
                level = WARN,
                correlation_id = %message.correlation_id(),
                attempt,
                error = %error,
                "Send attempt failed"
            );
        }

        result
    }

    /// Write one entry, bounded by the store timeout.
    async fn persist(&self, entry: DeliveryAttemptLog) {
        match tokio::time::timeout(self.store_timeout, self.store.record(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(
                    correlation_id = %entry.correlation_id,
                    succeeded = entry.succeeded,
                    error = %error,
                    "Failed to record delivery attempt"
                );
            }
            Err(_) => {
                tracing::warn!(
                    correlation_id = %entry.correlation_id,
                    succeeded = entry.succeeded,
                    timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Timed out recording delivery attempt"
                );
            }
        }
    }
}
