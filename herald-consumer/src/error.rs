use herald_common::MessageError;
use thiserror::Error;

/// Why an event could not be turned into a delivered email.
///
/// Only [`ConsumerError::CircuitOpen`] and
/// [`ConsumerError::ExhaustedDeliveryFailure`] are worth redelivering; every
/// other kind would fail again in exactly the same way.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsumerError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Unable to compose message: {0}")]
    Compose(#[from] MessageError),

    #[error("Circuit open, delivery skipped")]
    CircuitOpen,

    #[error("Delivery failed after {attempts} attempt(s): {reason}")]
    ExhaustedDeliveryFailure { reason: String, attempts: u32 },
}

impl ConsumerError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen | Self::ExhaustedDeliveryFailure { .. }
        )
    }
}

impl From<serde_json::Error> for ConsumerError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedEvent(error.to_string())
    }
}

/// Failures raised by the in-memory bus itself
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus has shut down")]
    Closed,

    #[error("Bus is already being served")]
    AlreadyServing,

    #[error("Dead-letter routing failed: {0}")]
    DeadLetter(String),
}
