//! Audit record of a single dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::Message;

/// Detail recorded when a dispatch is skipped because the breaker is open.
pub const CIRCUIT_OPEN: &str = "circuit open";

/// One entry per terminal outcome of a dispatch.
///
/// Entries are append-only; nothing updates them once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttemptLog {
    pub id: Ulid,
    pub correlation_id: String,
    pub recipient: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Number of transport calls made, zero when the dispatch was skipped
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub transport: String,
}

impl DeliveryAttemptLog {
    fn new(message: &Message, transport: &str, attempts: u32) -> Self {
        Self {
            id: Ulid::new(),
            correlation_id: message.correlation_id().to_string(),
            recipient: message.recipient().to_string(),
            succeeded: false,
            error_detail: None,
            timestamp: Utc::now(),
            attempts,
            transport: transport.to_string(),
        }
    }

    #[must_use]
    pub fn success(message: &Message, transport: &str, attempts: u32) -> Self {
        Self {
            succeeded: true,
            ..Self::new(message, transport, attempts)
        }
    }

    #[must_use]
    pub fn failure(
        message: &Message,
        transport: &str,
        attempts: u32,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::new(message, transport, attempts)
        }
    }

    #[must_use]
    pub fn circuit_open(message: &Message, transport: &str) -> Self {
        Self::failure(message, transport, 0, CIRCUIT_OPEN)
    }

    #[must_use]
    pub fn was_skipped(&self) -> bool {
        !self.succeeded && self.attempts == 0 && self.error_detail.as_deref() == Some(CIRCUIT_OPEN)
    }
}
