//! Resilient email delivery
//!
//! This crate provides:
//! - A circuit breaker gating calls to the email provider
//! - A bounded retry policy around each delivery call
//! - SMTP and HTTP API transports
//! - Append-only stores for delivery attempt records
//! - The [`Dispatcher`] composing all of the above

pub mod circuit_breaker;
mod config;
mod dispatcher;
pub mod error;
pub mod policy;
pub mod store;
pub mod transport;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats,
    CircuitState, Permit,
};
pub use config::DeliveryConfig;
pub use dispatcher::{DeliveryOutcome, Dispatcher};
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
pub use herald_common::{DeliveryAttemptLog, Message};
pub use policy::{RetryError, RetryPolicy};
pub use store::{AttemptStore, AttemptStoreConfig, MemoryAttemptStore, TestAttemptStore};
pub use transport::{EmailTransport, TestTransport, TransportConfig};
