use async_trait::async_trait;
use herald_common::tracing;

use super::{DeadLetter, DeadLetterRouter};
use crate::error::BusError;

/// Logs dead letters at error level and drops them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDeadLetterRouter;

#[async_trait]
impl DeadLetterRouter for LogDeadLetterRouter {
    async fn route(&self, dead_letter: DeadLetter) -> Result<(), BusError> {
        tracing::error!(
            id = %dead_letter.id,
            topic = %dead_letter.topic,
            deliveries = dead_letter.deliveries,
            reason = %dead_letter.reason,
            payload = %dead_letter.payload_lossy(),
            "Event dead-lettered"
        );

        Ok(())
    }
}
