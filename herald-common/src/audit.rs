//! Audit logging for the dispatch lifecycle
//!
//! Every event is a structured `tracing` event carrying an `event` field, so
//! a JSON subscriber produces one machine-readable line per lifecycle step.
//!
//! ## Audit Events
//!
//! - `EventReceived`: An inbound event was accepted for processing
//! - `DispatchAttempt`: A single transport call is about to be made
//! - `DeliverySuccess`: The provider accepted the message
//! - `DeliveryFailure`: The retry sequence ended without success
//! - `DeliverySkipped`: The breaker was open and no send was made
//! - `DeadLettered`: The bus gave up redelivering an event
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replace the local part of recipient addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Initialize audit logging. Only the first call has any effect.
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}

pub fn log_event_received(topic: &str, event_type: &str, correlation_id: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::INFO,
        event = "EventReceived",
        topic = %topic,
        event_type = %event_type,
        correlation_id = %correlation_id,
        "Audit: Event received"
    );
}

/// Logged before each transport call; `attempt` is 1-based.
pub fn log_dispatch_attempt(correlation_id: &str, recipient: &str, transport: &str, attempt: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    let recipient = redact_email(recipient, config.redact_recipients);

    tracing::event!(
        tracing::Level::INFO,
        event = "DispatchAttempt",
        correlation_id = %correlation_id,
        recipient = %recipient,
        transport = %transport,
        attempt,
        "Audit: Dispatch attempt"
    );
}

pub fn log_delivery_success(
    correlation_id: &str,
    recipient: &str,
    transport: &str,
    attempts: u32,
    duration_ms: u128,
) {
    let config = config();
    if !config.enabled {
        return;
    }

    let recipient = redact_email(recipient, config.redact_recipients);

    tracing::event!(
        tracing::Level::INFO,
        event = "DeliverySuccess",
        correlation_id = %correlation_id,
        recipient = %recipient,
        transport = %transport,
        attempts,
        duration_ms,
        "Audit: Delivery successful"
    );
}

pub fn log_delivery_failure(correlation_id: &str, recipient: &str, error: &str, attempts: u32) {
    let config = config();
    if !config.enabled {
        return;
    }

    let recipient = redact_email(recipient, config.redact_recipients);

    tracing::event!(
        tracing::Level::WARN,
        event = "DeliveryFailure",
        correlation_id = %correlation_id,
        recipient = %recipient,
        error = %error,
        attempts,
        "Audit: Delivery failed"
    );
}

pub fn log_delivery_skipped(correlation_id: &str, recipient: &str, breaker: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    let recipient = redact_email(recipient, config.redact_recipients);

    tracing::event!(
        tracing::Level::WARN,
        event = "DeliverySkipped",
        correlation_id = %correlation_id,
        recipient = %recipient,
        breaker = %breaker,
        "Audit: Delivery skipped, circuit open"
    );
}

pub fn log_dead_letter(topic: &str, attempts: u32, reason: &str) {
    let config = config();
    if !config.enabled {
        return;
    }

    tracing::event!(
        tracing::Level::WARN,
        event = "DeadLettered",
        topic = %topic,
        attempts,
        reason = %reason,
        "Audit: Event dead-lettered"
    );
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn redacts_local_part() {
        assert_eq!(
            redact_email("user@example.com", true),
            "[REDACTED]@example.com"
        );
        assert_eq!(redact_email("user@example.com", false), "user@example.com");
        assert_eq!(redact_email("invalid", true), "[REDACTED]");
        assert_eq!(redact_email("invalid", false), "invalid");
    }

    #[test]
    fn default_config() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert!(!config.redact_recipients);
    }

    #[test]
    fn logging_without_subscriber_is_harmless() {
        log_event_received("user-events", "UserRegistered", "u1");
        log_dispatch_attempt("u1", "a@b.com", "smtp", 1);
        log_delivery_success("u1", "a@b.com", "smtp", 1, 12);
        log_delivery_failure("u1", "a@b.com", "connection refused", 3);
        log_delivery_skipped("u1", "a@b.com", "email");
        log_dead_letter("user-events", 4, "delivery failed");
    }
}
