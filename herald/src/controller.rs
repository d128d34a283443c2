use std::sync::{Arc, LazyLock};

use herald_common::{Signal, audit, audit::AuditConfig, internal, logging, tracing};
use herald_consumer::{
    AppConfig, BusConfig, ConsumerConfig, EventConsumer, InMemoryBus, WorkerPool,
};
use herald_delivery::{CircuitBreakerRegistry, DeliveryConfig, Dispatcher};
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinSet};

use crate::bridge;

/// Top-level configuration, read from `herald.config.ron`
///
/// ```ron
/// (
///     delivery: (
///         transport: Smtp(host: "mail.example.com", from_address: "noreply@example.com"),
///     ),
///     bus: (max_redeliveries: 3),
///     consumers: [
///         (topic: "user-events", family: UserRegistered),
///         (topic: "application-events", family: ApplicationSubmitted),
///     ],
///     app: (name: "JobHub", url: "https://jobhub.com"),
///     audit: (redact_recipients: true),
/// )
/// ```
#[derive(Debug, Deserialize)]
pub struct Herald {
    #[serde(default)]
    delivery: DeliveryConfig,
    #[serde(default)]
    bus: BusConfig,
    #[serde(default = "ConsumerConfig::defaults")]
    consumers: Vec<ConsumerConfig>,
    #[serde(default)]
    app: AppConfig,
    #[serde(default)]
    audit: AuditConfig,
    /// Publish `<topic> <json>` lines read from standard input
    #[serde(default)]
    stdin: bool,
}

impl Default for Herald {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            bus: BusConfig::default(),
            consumers: ConsumerConfig::defaults(),
            app: AppConfig::default(),
            audit: AuditConfig::default(),
            stdin: false,
        }
    }
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forced shutdown");

    Ok(())
}

/// Everything built from a [`Herald`] configuration, ready to run
#[derive(Debug)]
pub struct Service {
    bus: InMemoryBus,
    breakers: CircuitBreakerRegistry,
    consumers: Vec<EventConsumer>,
    workers: Vec<usize>,
    stdin: bool,
}

impl Herald {
    /// Construct the transport, breakers, bus and consumers.
    ///
    /// # Errors
    ///
    /// Fails if the configured transport cannot be built.
    pub fn build(self) -> anyhow::Result<Service> {
        let breakers = CircuitBreakerRegistry::new(self.delivery.circuit_breaker.clone());
        let dispatcher = Arc::new(Dispatcher::from_config(self.delivery, &breakers)?);
        let app = Arc::new(self.app);

        internal!(
            level = INFO,
            transport = dispatcher.transport_name(),
            breaker = dispatcher.breaker().name(),
            "Dispatcher ready"
        );

        let (consumers, workers) = self
            .consumers
            .iter()
            .map(|config| {
                (
                    EventConsumer::new(config, Arc::clone(&dispatcher), Arc::clone(&app)),
                    config.workers,
                )
            })
            .unzip();

        Ok(Service {
            bus: InMemoryBus::new(self.bus),
            breakers,
            consumers,
            workers,
            stdin: self.stdin,
        })
    }

    /// Run this controller, and everything it controls
    ///
    /// # Errors
    ///
    /// This function will return an error if the service fails to build, or
    /// signal handlers cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());

        internal!(level = INFO, "Controller running");

        let service = self.build()?;

        let ret = tokio::select! {
            r = service.serve(&SHUTDOWN_BROADCAST) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

impl Service {
    #[must_use]
    pub const fn bus(&self) -> &InMemoryBus {
        &self.bus
    }

    #[must_use]
    pub const fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Run every worker pool and the bus until `signals` carries a shutdown.
    ///
    /// Workers finish their in-flight events before the bus stops, so their
    /// settlements are still processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus fails or the stdin bridge hits an I/O error.
    pub async fn serve(self, signals: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        let mut shutdown = signals.subscribe();

        let (bus_signal, bus_receiver) = broadcast::channel(1);
        let bus_task = {
            let bus = self.bus.clone();
            tokio::spawn(async move { bus.serve(bus_receiver).await })
        };

        let mut workers = JoinSet::new();
        for (consumer, count) in self.consumers.into_iter().zip(self.workers) {
            let pool = WorkerPool::new(
                Arc::new(consumer.clone()),
                self.bus.subscribe(consumer.topic()),
                count,
            );
            internal!(
                level = INFO,
                topic = %consumer.topic(),
                family = %consumer.family(),
                workers = count,
                "Consumer subscribed"
            );

            let receiver = signals.subscribe();
            workers.spawn(async move { pool.serve(receiver).await });
        }

        let bridge = if self.stdin {
            let bus = self.bus.clone();
            let receiver = signals.subscribe();
            Some(tokio::spawn(async move {
                bridge::forward(tokio::io::BufReader::new(tokio::io::stdin()), &bus, receiver).await
            }))
        } else {
            None
        };

        match shutdown.recv().await {
            Ok(signal) => internal!(level = INFO, "Service received {signal:?}"),
            Err(e) => tracing::error!("Service shutdown channel error: {e}"),
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker pool failed: {e}");
            }
        }

        let _ = bus_signal.send(Signal::Shutdown);
        bus_task.await??;

        let stats = self.bus.stats();
        internal!(
            level = INFO,
            published = stats.published,
            acked = stats.acked,
            nacked = stats.nacked,
            dead_lettered = stats.dead_lettered,
            "Bus drained"
        );
        for (name, stats) in self.breakers.stats() {
            internal!(level = INFO, breaker = %name, state = ?stats.state, "Breaker final state");
        }

        let _ = signals.send(Signal::Finalised);

        if let Some(bridge) = bridge {
            bridge.await??;
        }

        Ok(())
    }
}
