//! Policy abstractions for delivery operations.
//!
//! - [`RetryPolicy`]: bounded re-attempts around a single delivery call
//! - [`backoff`]: exponential delay calculation shared with bus redelivery

pub mod backoff;
pub mod retry;

pub use retry::{Attempted, RetryError, RetryPolicy, Retryable};
