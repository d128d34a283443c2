//! Durable record of dispatch outcomes.
//!
//! Exactly one [`DeliveryAttemptLog`] is written per dispatch. Stores are
//! append-only; nothing is ever updated or removed through this interface.

mod file;
mod log;
mod memory;
mod test;

use std::{fmt::Debug, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use herald_common::DeliveryAttemptLog;
use serde::Deserialize;
use thiserror::Error;

pub use self::{
    file::FileAttemptStore, log::LogAttemptStore, memory::MemoryAttemptStore,
    test::TestAttemptStore,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store full: {0} entries")]
    CapacityExceeded(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait AttemptStore: Send + Sync + Debug {
    async fn record(&self, entry: &DeliveryAttemptLog) -> Result<()>;
}

/// Selects the attempt store backend.
///
/// ```ron
/// store: File(path: "/var/lib/herald/attempts.jsonl"),
/// ```
///
/// ```ron
/// store: Memory(capacity: Some(10000)),
/// ```
///
/// `Log` writes each entry as a structured log event and keeps nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub enum AttemptStoreConfig {
    File(FileStoreConfig),
    Memory(MemoryStoreConfig),
    #[default]
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileStoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum number of entries kept (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl AttemptStoreConfig {
    #[must_use]
    pub fn into_store(self) -> Arc<dyn AttemptStore> {
        match self {
            Self::File(config) => Arc::new(FileAttemptStore::new(config.path)),
            Self::Memory(config) => Arc::new(
                config
                    .capacity
                    .map_or_else(MemoryAttemptStore::new, MemoryAttemptStore::with_capacity),
            ),
            Self::Log => Arc::new(LogAttemptStore),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_ron() {
        let config: AttemptStoreConfig =
            ron::from_str(r#"File(path: "/tmp/attempts.jsonl")"#).unwrap();
        assert!(
            matches!(config, AttemptStoreConfig::File(ref c) if c.path == PathBuf::from("/tmp/attempts.jsonl"))
        );

        let config: AttemptStoreConfig = ron::from_str("Memory(capacity: Some(5))").unwrap();
        assert!(matches!(
            config,
            AttemptStoreConfig::Memory(MemoryStoreConfig { capacity: Some(5) })
        ));

        let config: AttemptStoreConfig = ron::from_str("Log").unwrap();
        assert!(matches!(config, AttemptStoreConfig::Log));
    }
}
