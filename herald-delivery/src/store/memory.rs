use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use herald_common::DeliveryAttemptLog;

use super::{AttemptStore, StoreError};

/// In-memory attempt store
///
/// Entries are kept in insertion order. Mainly for tests and development;
/// everything is lost on restart.
///
/// # Capacity Management
/// With a capacity set, writes beyond it fail rather than grow without bound.
#[derive(Debug, Clone, Default)]
pub struct MemoryAttemptStore {
    pub(crate) entries: Arc<RwLock<Vec<DeliveryAttemptLog>>>,
    capacity: Option<usize>,
}

impl MemoryAttemptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Recovers gracefully if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Snapshot of every entry, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<DeliveryAttemptLog> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn for_correlation(&self, correlation_id: &str) -> Vec<DeliveryAttemptLog> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn record(&self, entry: &DeliveryAttemptLog) -> super::Result<()> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(cap) = self.capacity
            && entries.len() >= cap
        {
            return Err(StoreError::CapacityExceeded(cap));
        }

        entries.push(entry.clone());
        Ok(())
    }
}
