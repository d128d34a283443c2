use std::time::Duration;

use serde::Deserialize;

use crate::{
    circuit_breaker::CircuitBreakerConfig, policy::RetryPolicy, store::AttemptStoreConfig,
    transport::TransportConfig,
};

/// Everything needed to build a [`crate::Dispatcher`]
///
/// ```ron
/// delivery: (
///     transport: Smtp(host: "mail.example.com", from_address: "noreply@example.com"),
///     retry: (max_attempts: 3),
///     circuit_breaker: (failure_rate_threshold: 50.0, wait_duration_ms: 30000),
///     store: File(path: "/var/lib/herald/attempts.jsonl"),
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Name of the breaker guarding the transport
    #[serde(default = "default_breaker")]
    pub breaker: String,

    #[serde(default)]
    pub store: AttemptStoreConfig,

    /// Upper bound on a single transport call (seconds)
    ///
    /// Default: 10 seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Upper bound on writing one attempt log entry (milliseconds)
    ///
    /// Default: 2000 milliseconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            breaker: default_breaker(),
            store: AttemptStoreConfig::default(),
            send_timeout_secs: default_send_timeout(),
            store_timeout_ms: default_store_timeout(),
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn default_breaker() -> String {
    "email".to_string()
}

const fn default_send_timeout() -> u64 {
    10
}

const fn default_store_timeout() -> u64 {
    2_000
}
