use std::time::Duration;

use herald_delivery::policy::backoff::exponential_delay;
use serde::Deserialize;

use crate::{dead_letter::DeadLetterConfig, event::EventFamily};

/// Redelivery behaviour of the in-memory bus
///
/// ```ron
/// bus: (
///     max_redeliveries: 3,
///     redelivery_base_ms: 2000,
///     dead_letter: Topic,
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Redeliveries after the first delivery before dead-lettering
    ///
    /// Default: 3
    #[serde(default = "defaults::max_redeliveries")]
    pub max_redeliveries: u32,

    /// Delay before the first redelivery (milliseconds), doubling after
    ///
    /// Default: 2000 milliseconds
    #[serde(default = "defaults::redelivery_base_ms")]
    pub redelivery_base_ms: u64,

    /// Upper bound on a single redelivery delay (milliseconds)
    ///
    /// Default: 30000 milliseconds
    #[serde(default = "defaults::redelivery_max_ms")]
    pub redelivery_max_ms: u64,

    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,

    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: defaults::max_redeliveries(),
            redelivery_base_ms: defaults::redelivery_base_ms(),
            redelivery_max_ms: defaults::redelivery_max_ms(),
            jitter_factor: defaults::jitter_factor(),
            dead_letter: DeadLetterConfig::default(),
        }
    }
}

impl BusConfig {
    /// Wait before redelivering an event that was rejected on `delivery`
    #[must_use]
    pub fn redelivery_delay(&self, delivery: u32) -> Duration {
        exponential_delay(
            delivery,
            self.redelivery_base_ms,
            self.redelivery_max_ms,
            self.jitter_factor,
        )
    }
}

/// What to do with an event whose dispatch was skipped by an open breaker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CircuitOpenPolicy {
    /// Treat the skip as handled; the email is not sent
    #[default]
    Acknowledge,
    /// Leave the event unacknowledged so the bus tries again later
    Redeliver,
}

/// One subscription and the workers draining it
///
/// ```ron
/// consumers: [
///     (topic: "user-events", family: UserRegistered, workers: 2),
///     (topic: "application-events", family: ApplicationSubmitted, circuit_open: Redeliver),
/// ],
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsumerConfig {
    pub topic: String,

    pub family: EventFamily,

    /// Default: 2
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    #[serde(default)]
    pub circuit_open: CircuitOpenPolicy,
}

impl ConsumerConfig {
    #[must_use]
    pub fn new(family: EventFamily) -> Self {
        Self {
            topic: family.default_topic().to_string(),
            family,
            workers: defaults::workers(),
            circuit_open: CircuitOpenPolicy::default(),
        }
    }

    /// One consumer per event family on its usual topic
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(EventFamily::UserRegistered),
            Self::new(EventFamily::ApplicationSubmitted),
        ]
    }
}

mod defaults {
    pub const fn max_redeliveries() -> u32 {
        3
    }

    pub const fn redelivery_base_ms() -> u64 {
        2_000
    }

    pub const fn redelivery_max_ms() -> u64 {
        30_000
    }

    pub const fn jitter_factor() -> f64 {
        0.1
    }

    pub const fn workers() -> usize {
        2
    }
}
