use async_trait::async_trait;
use herald_common::{DeliveryAttemptLog, audit, tracing};

use super::AttemptStore;

/// Records entries as structured log events only.
///
/// Used when no durable store is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAttemptStore;

#[async_trait]
impl AttemptStore for LogAttemptStore {
    async fn record(&self, entry: &DeliveryAttemptLog) -> super::Result<()> {
        let recipient = audit::redact_email(&entry.recipient, audit::config().redact_recipients);

        tracing::info!(
            id = %entry.id,
            correlation_id = %entry.correlation_id,
            recipient = %recipient,
            succeeded = entry.succeeded,
            error_detail = entry.error_detail.as_deref().unwrap_or_default(),
            attempts = entry.attempts,
            transport = %entry.transport,
            timestamp = %entry.timestamp.to_rfc3339(),
            "Delivery attempt recorded"
        );

        Ok(())
    }
}
