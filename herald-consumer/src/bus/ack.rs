use herald_common::inbound;
use tokio::sync::mpsc;

use super::Envelope;

/// How a delivery was settled by its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ack,
    /// Rejected; the bus redelivers or dead-letters the event
    Nack(String),
}

/// A settled delivery on its way back to the bus
#[derive(Debug)]
pub struct Settlement {
    pub envelope: Envelope,
    pub verdict: Verdict,
}

/// Manual acknowledgment for one delivery.
///
/// Settling consumes the handle. Dropping a handle that was never settled
/// counts as a rejection, so a worker that bails out early cannot lose an
/// event.
#[derive(Debug)]
pub struct AckHandle {
    envelope: Option<Envelope>,
    settlements: mpsc::UnboundedSender<Settlement>,
}

impl AckHandle {
    pub fn new(envelope: Envelope, settlements: mpsc::UnboundedSender<Settlement>) -> Self {
        Self {
            envelope: Some(envelope),
            settlements,
        }
    }

    /// Delivery count of the underlying event, starting at 1
    #[must_use]
    pub fn delivery(&self) -> u32 {
        self.envelope.as_ref().map_or(0, |envelope| envelope.delivery)
    }

    pub fn ack(mut self) {
        self.settle(Verdict::Ack);
    }

    pub fn nack(mut self, reason: impl Into<String>) {
        self.settle(Verdict::Nack(reason.into()));
    }

    fn settle(&mut self, verdict: Verdict) {
        let Some(envelope) = self.envelope.take() else {
            return;
        };

        if self.settlements.send(Settlement { envelope, verdict }).is_err() {
            inbound!(
                level = WARN,
                "Bus is gone, settlement discarded"
            );
        }
    }
}

impl Drop for AckHandle {
    fn drop(&mut self) {
        if self.envelope.is_some() {
            inbound!(
                level = DEBUG,
                delivery = self.delivery(),
                "Ack handle dropped unsettled, rejecting"
            );
            self.settle(Verdict::Nack("not acknowledged".to_string()));
        }
    }
}
