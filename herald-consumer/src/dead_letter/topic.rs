use async_trait::async_trait;
use herald_common::inbound;

use super::{DeadLetter, DeadLetterRouter};
use crate::{bus::WeakBus, error::BusError};

/// Republishes dead letters to `<topic>.DLT` on the bus they came from
#[derive(Debug, Clone)]
pub struct TopicDeadLetterRouter {
    bus: WeakBus,
}

impl TopicDeadLetterRouter {
    pub const fn new(bus: WeakBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl DeadLetterRouter for TopicDeadLetterRouter {
    async fn route(&self, dead_letter: DeadLetter) -> Result<(), BusError> {
        let bus = self.bus.upgrade().ok_or(BusError::Closed)?;
        let topic = dead_letter.dead_letter_topic();
        let id = bus.publish(&topic, dead_letter.payload)?;

        inbound!(
            level = DEBUG,
            id = %id,
            original = %dead_letter.id,
            topic = %topic,
            "Published dead letter"
        );

        Ok(())
    }
}
