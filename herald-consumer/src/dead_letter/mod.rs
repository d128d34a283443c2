//! Final destination for events the bus has given up redelivering.
//!
//! The bus routes an event here once its redelivery budget is spent. The
//! consumer never calls a router directly.

mod log;
mod memory;
mod topic;

use std::{borrow::Cow, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use ulid::Ulid;

pub use self::{log::LogDeadLetterRouter, memory::MemoryDeadLetterRouter, topic::TopicDeadLetterRouter};
use crate::{
    bus::{Envelope, InMemoryBus},
    error::BusError,
};

/// Appended to the source topic to name its dead-letter topic
pub const DEAD_LETTER_SUFFIX: &str = ".DLT";

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Ulid,
    pub topic: String,
    pub payload: Arc<[u8]>,
    /// Total deliveries made before giving up
    pub deliveries: u32,
    /// Reason given by the final rejection
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(envelope: Envelope, reason: impl Into<String>) -> Self {
        Self {
            id: envelope.id,
            topic: envelope.topic.to_string(),
            payload: envelope.payload,
            deliveries: envelope.delivery,
            reason: reason.into(),
            dead_lettered_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn dead_letter_topic(&self) -> String {
        format!("{}{DEAD_LETTER_SUFFIX}", self.topic)
    }

    #[must_use]
    pub fn payload_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[async_trait]
pub trait DeadLetterRouter: Send + Sync + Debug {
    async fn route(&self, dead_letter: DeadLetter) -> Result<(), BusError>;
}

/// Selects where dead letters go.
///
/// ```ron
/// dead_letter: Topic,
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum DeadLetterConfig {
    /// Republish to `<topic>.DLT` on the same bus
    #[default]
    Topic,
    /// Emit an error-level log event and drop
    Log,
}

impl DeadLetterConfig {
    pub fn into_router(self, bus: &InMemoryBus) -> Arc<dyn DeadLetterRouter> {
        match self {
            Self::Topic => Arc::new(TopicDeadLetterRouter::new(bus.downgrade())),
            Self::Log => Arc::new(LogDeadLetterRouter),
        }
    }
}
