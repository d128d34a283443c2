//! Supervised workers draining one subscription.
//!
//! Each worker handles one event at a time. A worker that panics is logged
//! and replaced; the delivery it was holding is rejected when its ack handle
//! is dropped during unwinding, so the bus redelivers it.

use std::{sync::Arc, time::Duration};

use herald_common::{Signal, inbound, internal, tracing};
use tokio::{sync::broadcast, task::JoinSet};

use crate::{
    bus::{Delivery, Subscription},
    consumer::EventHandler,
};

/// How long in-flight events may take to finish once shutdown begins
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WorkerPool {
    handler: Arc<dyn EventHandler>,
    subscription: Subscription,
    workers: usize,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// `workers` is raised to at least one.
    pub fn new(handler: Arc<dyn EventHandler>, subscription: Subscription, workers: usize) -> Self {
        Self {
            handler,
            subscription,
            workers: workers.max(1),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_shutdown_timeout(self, shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_timeout,
            ..self
        }
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    /// Run the workers until shutdown, replacing any that panic.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let topic = self.subscription.topic();
        internal!(level = INFO, topic = %topic, workers = self.workers, "Worker pool starting");

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            self.spawn(&mut workers, id, shutdown.resubscribe());
        }
        let mut next_id = self.workers;

        loop {
            tokio::select! {
                Some(joined) = workers.join_next() => {
                    match joined {
                        Ok(id) => internal!(topic = %topic, worker = id, "Worker finished"),
                        Err(e) if e.is_panic() => {
                            tracing::error!(topic = %topic, "Worker panicked, restarting: {e}");
                            self.spawn(&mut workers, next_id, shutdown.resubscribe());
                            next_id += 1;
                        }
                        Err(e) => tracing::warn!(topic = %topic, "Worker cancelled: {e}"),
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, topic = %topic, "Worker pool received shutdown signal");
                        }
                        Err(e) => tracing::error!(topic = %topic, "Worker pool shutdown channel error: {e}"),
                    }
                    break;
                }
            }
        }

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                topic = %topic,
                remaining = workers.len(),
                "Shutdown timeout exceeded, unsettled events will be redelivered"
            );
            workers.abort_all();
        }

        internal!(level = INFO, topic = %topic, "Worker pool shutdown complete");
    }

    fn spawn(&self, workers: &mut JoinSet<usize>, id: usize, shutdown: broadcast::Receiver<Signal>) {
        let handler = Arc::clone(&self.handler);
        let subscription = self.subscription.clone();

        workers.spawn(async move {
            work(id, handler.as_ref(), &subscription, shutdown).await;
            id
        });
    }
}

async fn work(
    id: usize,
    handler: &dyn EventHandler,
    subscription: &Subscription,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    loop {
        // Shutdown is only observed between events; an in-flight event
        // always runs to settlement.
        let delivery = tokio::select! {
            delivery = subscription.next() => delivery,
            _ = shutdown.recv() => return,
        };

        let Some(Delivery { envelope, ack }) = delivery else {
            return;
        };

        match handler.on_event(&envelope.payload, ack).await {
            Ok(disposition) => inbound!(
                worker = id,
                id = %envelope.id,
                delivery = envelope.delivery,
                "Event handled: {disposition:?}"
            ),
            Err(error) => inbound!(
                level = DEBUG,
                worker = id,
                id = %envelope.id,
                delivery = envelope.delivery,
                "Event rejected: {error}"
            ),
        }
    }
}
