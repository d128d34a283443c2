//! Maps one bus delivery to at most one dispatched email and settles it.
//!
//! | Outcome                          | Settlement                     |
//! |----------------------------------|--------------------------------|
//! | delivered                        | ack                            |
//! | malformed, unknown type, compose | ack, dropped                   |
//! | circuit open                     | ack, or nack under `Redeliver` |
//! | delivery exhausted               | nack                           |

use std::sync::Arc;

use async_trait::async_trait;
use herald_common::{audit, inbound};
use herald_delivery::{DeliveryOutcome, Dispatcher};

use crate::{
    bus::AckHandle,
    composer::{AppConfig, compose},
    config::{CircuitOpenPolicy, ConsumerConfig},
    error::ConsumerError,
    event::{Event, EventFamily},
};

/// How an acknowledged event was handled
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The provider accepted the email
    Delivered { attempts: u32 },
    /// The breaker was open and the email was not sent
    Skipped,
    /// The event can never produce an email and was dropped
    Discarded(ConsumerError),
}

/// Something that can process raw bus payloads
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process `raw` and settle `ack`.
    ///
    /// `Ok` means the event was acknowledged; `Err` means it was rejected and
    /// the bus will redeliver it.
    async fn on_event(&self, raw: &[u8], ack: AckHandle) -> Result<Disposition, ConsumerError>;
}

#[derive(Debug, Clone)]
pub struct EventConsumer {
    topic: String,
    family: EventFamily,
    circuit_open: CircuitOpenPolicy,
    dispatcher: Arc<Dispatcher>,
    app: Arc<AppConfig>,
}

impl EventConsumer {
    pub fn new(config: &ConsumerConfig, dispatcher: Arc<Dispatcher>, app: Arc<AppConfig>) -> Self {
        Self {
            topic: config.topic.clone(),
            family: config.family,
            circuit_open: config.circuit_open,
            dispatcher,
            app,
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn family(&self) -> EventFamily {
        self.family
    }

    async fn handle(&self, raw: &[u8]) -> Result<Disposition, ConsumerError> {
        let event = Event::parse(raw, self.family)?;
        audit::log_event_received(&self.topic, self.family.event_type(), event.correlation_id());

        let message = compose(&event, &self.app)?;

        match self.dispatcher.dispatch(&message).await {
            DeliveryOutcome::Succeeded { attempts } => Ok(Disposition::Delivered { attempts }),
            DeliveryOutcome::Skipped => match self.circuit_open {
                CircuitOpenPolicy::Acknowledge => Ok(Disposition::Skipped),
                CircuitOpenPolicy::Redeliver => Err(ConsumerError::CircuitOpen),
            },
            DeliveryOutcome::Failed { reason, attempts } => {
                Err(ConsumerError::ExhaustedDeliveryFailure { reason, attempts })
            }
        }
    }
}

#[async_trait]
impl EventHandler for EventConsumer {
    async fn on_event(&self, raw: &[u8], ack: AckHandle) -> Result<Disposition, ConsumerError> {
        let delivery = ack.delivery();

        match self.handle(raw).await {
            Ok(disposition) => {
                ack.ack();
                Ok(disposition)
            }
            Err(error) if error.is_retryable() => {
                inbound!(
                    level = WARN,
                    topic = %self.topic,
                    delivery,
                    error = %error,
                    "Event left unacknowledged for redelivery"
                );
                ack.nack(error.to_string());
                Err(error)
            }
            Err(error) => {
                inbound!(
                    level = WARN,
                    topic = %self.topic,
                    delivery,
                    error = %error,
                    "Discarding event"
                );
                ack.ack();
                Ok(Disposition::Discarded(error))
            }
        }
    }
}
