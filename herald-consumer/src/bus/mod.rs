//! In-process event bus with at-least-once delivery.
//!
//! Each topic is a queue shared by every subscription to it, so workers on
//! the same topic compete for events. A delivery stays outstanding until its
//! [`AckHandle`] is settled:
//!
//! ```text
//! publish ─> topic queue ─> Subscription::next ─> consumer
//!                 ^                                   │
//!                 │                          ack ─────┤───── nack / drop
//!                 │                           │       │
//!            sleep(backoff) <── delivery ≤ max   done  delivery > max ─> DeadLetterRouter
//! ```
//!
//! Settlements are processed by [`InMemoryBus::serve`]; without it running,
//! rejected events are never redelivered.

mod ack;

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herald_common::{Signal, audit, inbound, internal, tracing};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{Mutex as AsyncMutex, broadcast, mpsc},
    task::JoinSet,
};
use ulid::Ulid;

pub use self::ack::{AckHandle, Settlement, Verdict};
use crate::{
    config::BusConfig,
    dead_letter::{DeadLetter, DeadLetterRouter},
    error::BusError,
};

/// One event as carried by the bus
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: Ulid,
    pub topic: Arc<str>,
    pub payload: Arc<[u8]>,
    /// Delivery count, starting at 1
    pub delivery: u32,
    pub published_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(topic: &str, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: Ulid::new(),
            topic: Arc::from(topic),
            payload: payload.into(),
            delivery: 1,
            published_at: Utc::now(),
        }
    }

    #[must_use]
    fn redelivered(self) -> Self {
        Self {
            delivery: self.delivery.saturating_add(1),
            ..self
        }
    }
}

/// An event handed to a consumer together with its acknowledgment
#[derive(Debug)]
pub struct Delivery {
    pub envelope: Envelope,
    pub ack: AckHandle,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    redelivered: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of the bus counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

#[derive(Debug)]
struct Topic {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope>>>,
}

impl Topic {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(AsyncMutex::new(receiver)),
        }
    }
}

#[derive(Debug)]
struct Inner {
    config: BusConfig,
    topics: DashMap<String, Topic>,
    settlements: mpsc::UnboundedSender<Settlement>,
    settlement_receiver: Mutex<Option<mpsc::UnboundedReceiver<Settlement>>>,
    router: RwLock<Arc<dyn DeadLetterRouter>>,
    counters: Counters,
}

impl Inner {
    fn enqueue(&self, envelope: Envelope) -> Result<(), BusError> {
        let sender = self
            .topics
            .entry(envelope.topic.to_string())
            .or_insert_with(Topic::new)
            .sender
            .clone();

        sender.send(envelope).map_err(|_| BusError::Closed)
    }

    fn receiver(&self, topic: &str) -> Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope>>> {
        Arc::clone(
            &self
                .topics
                .entry(topic.to_string())
                .or_insert_with(Topic::new)
                .receiver,
        )
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

/// Non-owning handle to a bus, used by routers that publish back into it
#[derive(Debug, Clone)]
pub struct WeakBus {
    inner: Weak<Inner>,
}

impl WeakBus {
    pub fn upgrade(&self) -> Option<InMemoryBus> {
        self.inner.upgrade().map(|inner| InMemoryBus { inner })
    }
}

impl InMemoryBus {
    /// Create a bus routing dead letters as `config.dead_letter` describes.
    pub fn new(config: BusConfig) -> Self {
        let (settlements, settlement_receiver) = mpsc::unbounded_channel();
        let dead_letter = config.dead_letter;

        let bus = Self {
            inner: Arc::new(Inner {
                config,
                topics: DashMap::new(),
                settlements,
                settlement_receiver: Mutex::new(Some(settlement_receiver)),
                router: RwLock::new(Arc::new(crate::dead_letter::LogDeadLetterRouter)),
                counters: Counters::default(),
            }),
        };

        bus.set_dead_letter_router(dead_letter.into_router(&bus));
        bus
    }

    pub fn set_dead_letter_router(&self, router: Arc<dyn DeadLetterRouter>) {
        *self.inner.router.write() = router;
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Append an event to `topic`, creating the topic if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the topic queue has been torn down.
    pub fn publish(&self, topic: &str, payload: impl Into<Arc<[u8]>>) -> Result<Ulid, BusError> {
        let envelope = Envelope::new(topic, payload);
        let id = envelope.id;

        self.inner.enqueue(envelope)?;
        self.inner.counters.published.fetch_add(1, Ordering::Relaxed);

        inbound!(level = TRACE, id = %id, topic = %topic, "Published event");
        Ok(id)
    }

    /// Join the competing consumers of `topic`.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        Subscription {
            topic: Arc::from(topic),
            receiver: self.inner.receiver(topic),
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn stats(&self) -> BusStats {
        let counters = &self.inner.counters;
        BusStats {
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            acked: counters.acked.load(Ordering::Relaxed),
            nacked: counters.nacked.load(Ordering::Relaxed),
            redelivered: counters.redelivered.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    /// Process settlements until shutdown: schedule redeliveries with
    /// backoff and route exhausted events to the dead-letter router.
    ///
    /// Redeliveries still waiting on their backoff when shutdown arrives are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus is already being served.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), BusError> {
        let Some(mut settlements) = self.inner.settlement_receiver.lock().take() else {
            return Err(BusError::AlreadyServing);
        };

        internal!("Bus starting");

        let mut pending: JoinSet<Envelope> = JoinSet::new();

        loop {
            tokio::select! {
                Some(settlement) = settlements.recv() => {
                    self.settle(settlement, &mut pending).await;
                }
                Some(joined) = pending.join_next(), if !pending.is_empty() => {
                    match joined {
                        Ok(envelope) => self.redeliver(envelope),
                        Err(e) => tracing::error!("Redelivery task failed: {e}"),
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(
                                level = INFO,
                                dropped = pending.len(),
                                "Bus received shutdown signal"
                            );
                        }
                        Err(e) => {
                            tracing::error!("Bus shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        pending.abort_all();
        *self.inner.settlement_receiver.lock() = Some(settlements);

        internal!("Bus shutdown complete");
        Ok(())
    }

    async fn settle(&self, settlement: Settlement, pending: &mut JoinSet<Envelope>) {
        let Settlement { envelope, verdict } = settlement;
        let counters = &self.inner.counters;

        match verdict {
            Verdict::Ack => {
                counters.acked.fetch_add(1, Ordering::Relaxed);
                inbound!(
                    id = %envelope.id,
                    topic = %envelope.topic,
                    delivery = envelope.delivery,
                    "Event acknowledged"
                );
            }
            Verdict::Nack(reason) => {
                counters.nacked.fetch_add(1, Ordering::Relaxed);

                if envelope.delivery > self.inner.config.max_redeliveries {
                    self.dead_letter(envelope, reason).await;
                    return;
                }

                let delay = self.inner.config.redelivery_delay(envelope.delivery);
                inbound!(
                    level = DEBUG,
                    id = %envelope.id,
                    topic = %envelope.topic,
                    delivery = envelope.delivery,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = %reason,
                    "Event rejected, scheduling redelivery"
                );

                let next = envelope.redelivered();
                pending.spawn(async move {
                    tokio::time::sleep(delay).await;
                    next
                });
            }
        }
    }

    fn redeliver(&self, envelope: Envelope) {
        let id = envelope.id;
        match self.inner.enqueue(envelope) {
            Ok(()) => {
                self.inner.counters.redelivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::error!(id = %id, "Unable to redeliver event: {e}"),
        }
    }

    async fn dead_letter(&self, envelope: Envelope, reason: String) {
        audit::log_dead_letter(&envelope.topic, envelope.delivery, &reason);

        let letter = DeadLetter::new(envelope, reason);
        let id = letter.id;
        let router = Arc::clone(&*self.inner.router.read());

        match router.route(letter).await {
            Ok(()) => {
                self.inner.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::error!(id = %id, "Dead-letter routing failed: {e}"),
        }
    }
}

/// A consumer's view of one topic; clones compete for the same events
#[derive(Debug, Clone)]
pub struct Subscription {
    topic: Arc<str>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope>>>,
    inner: Arc<Inner>,
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next event. Cancel safe.
    pub async fn next(&self) -> Option<Delivery> {
        let envelope = self.receiver.lock().await.recv().await?;
        self.inner.counters.delivered.fetch_add(1, Ordering::Relaxed);

        Some(Delivery {
            ack: AckHandle::new(envelope.clone(), self.inner.settlements.clone()),
            envelope,
        })
    }
}
