//! Event consumption for herald
//!
//! This crate provides:
//! - An in-memory bus with manual acknowledgment and bounded redelivery
//! - Dead-letter routing for events that exhaust their redeliveries
//! - Typed events and the composers turning them into emails
//! - The [`EventConsumer`] settling each delivery from its dispatch outcome
//! - A supervised [`WorkerPool`] per subscription

pub mod bus;
pub mod composer;
mod config;
mod consumer;
pub mod dead_letter;
pub mod error;
pub mod event;
mod worker;

pub use bus::{AckHandle, BusStats, Delivery, Envelope, InMemoryBus, Subscription};
pub use composer::AppConfig;
pub use config::{BusConfig, CircuitOpenPolicy, ConsumerConfig};
pub use consumer::{Disposition, EventConsumer, EventHandler};
pub use dead_letter::{DeadLetter, DeadLetterConfig, DeadLetterRouter, MemoryDeadLetterRouter};
pub use error::{BusError, ConsumerError};
pub use event::{Event, EventFamily};
pub use worker::WorkerPool;
