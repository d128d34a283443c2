//! A running bus, consumer and worker pool wired to test doubles
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use herald_common::Signal;
use herald_consumer::{
    AppConfig, BusConfig, CircuitOpenPolicy, ConsumerConfig, EventConsumer, EventFamily,
    InMemoryBus, MemoryDeadLetterRouter, WorkerPool,
};
use herald_delivery::{
    CircuitBreaker, CircuitBreakerConfig, Dispatcher, EmailTransport, RetryPolicy,
    TestAttemptStore, TestTransport,
};
use tokio::{sync::broadcast, task::JoinHandle};

pub struct Pipeline {
    pub bus: InMemoryBus,
    pub transport: Arc<TestTransport>,
    pub store: TestAttemptStore,
    pub breaker: Arc<CircuitBreaker>,
    pub dead_letters: MemoryDeadLetterRouter,
    shutdown: broadcast::Sender<Signal>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn start(families: &[EventFamily], policy: CircuitOpenPolicy) -> Self {
        Self::start_with(TestTransport::new(), families, policy)
    }

    pub fn start_with(
        transport: TestTransport,
        families: &[EventFamily],
        policy: CircuitOpenPolicy,
    ) -> Self {
        let bus = InMemoryBus::new(BusConfig {
            redelivery_base_ms: 5,
            redelivery_max_ms: 20,
            jitter_factor: 0.0,
            ..BusConfig::default()
        });
        let dead_letters = MemoryDeadLetterRouter::new();
        bus.set_dead_letter_router(Arc::new(dead_letters.clone()));

        let transport = Arc::new(transport);
        let store = TestAttemptStore::new();
        let breaker = Arc::new(CircuitBreaker::from_config(
            "email",
            &CircuitBreakerConfig::default(),
        ));
        let dispatcher = Arc::new(
            Dispatcher::new(
                Arc::clone(&transport) as Arc<dyn EmailTransport>,
                Arc::clone(&breaker),
                Arc::new(store.clone()),
            )
            .with_retry_policy(RetryPolicy::default().with_backoff(0, 0)),
        );

        let (shutdown, _) = broadcast::channel(8);
        let mut tasks = Vec::new();

        {
            let bus = bus.clone();
            let rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let _ = bus.serve(rx).await;
            }));
        }

        let app = Arc::new(AppConfig::default());
        for family in families {
            let config = ConsumerConfig {
                circuit_open: policy,
                ..ConsumerConfig::new(*family)
            };
            let consumer = EventConsumer::new(&config, Arc::clone(&dispatcher), Arc::clone(&app));
            let pool = WorkerPool::new(
                Arc::new(consumer),
                bus.subscribe(&config.topic),
                config.workers,
            );
            let rx = shutdown.subscribe();
            tasks.push(tokio::spawn(async move { pool.serve(rx).await }));
        }

        Self {
            bus,
            transport,
            store,
            breaker,
            dead_letters,
            shutdown,
            tasks,
        }
    }

    pub fn publish(&self, topic: &str, payload: &str) {
        self.bus.publish(topic, payload.as_bytes()).unwrap();
    }

    /// Poll until `condition` holds or five seconds pass
    pub async fn until(&self, condition: impl Fn(&Self) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition(self) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(Signal::Shutdown);
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}
