use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_common::DeliveryAttemptLog;
use tokio::sync::Notify;

use super::{AttemptStore, StoreError, memory::MemoryAttemptStore};

/// Testing utilities for the memory-backed attempt store
///
/// Adds waiting for writes, failure injection and slow writes on top of
/// [`MemoryAttemptStore`].
#[derive(Debug, Clone, Default)]
pub struct TestAttemptStore {
    inner: MemoryAttemptStore,
    notify: Arc<Notify>,
    failing: Arc<AtomicBool>,
    delay: Arc<parking_lot::Mutex<Option<Duration>>>,
}

impl TestAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent write
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Wait until at least `expected` entries have been written
    ///
    /// # Errors
    /// Returns an error if the timeout is reached before the expected count
    pub async fn wait_for_count(&self, expected: usize, timeout: Duration) -> super::Result<()> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.inner.len() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|e| StoreError::Internal(format!("Timeout waiting for entries: {e}")))
    }

    pub fn entries(&self) -> Vec<DeliveryAttemptLog> {
        self.inner.entries()
    }

    pub fn for_correlation(&self, correlation_id: &str) -> Vec<DeliveryAttemptLog> {
        self.inner.for_correlation(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[async_trait]
impl AttemptStore for TestAttemptStore {
    async fn record(&self, entry: &DeliveryAttemptLog) -> super::Result<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("injected store failure".to_string()));
        }

        self.inner.record(entry).await?;
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use herald_common::Message;

    use super::*;

    fn entry() -> DeliveryAttemptLog {
        let message = Message::new("a@b.com", "Subject", "Body", "u1").unwrap();
        DeliveryAttemptLog::success(&message, "test", 1)
    }

    #[tokio::test]
    async fn wait_for_count_sees_concurrent_writes() {
        let store = TestAttemptStore::new();

        let writer = store.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                writer.record(&entry()).await.unwrap();
            }
        });

        store
            .wait_for_count(3, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = TestAttemptStore::new();
        store.set_failing(true);
        assert!(store.record(&entry()).await.is_err());

        store.set_failing(false);
        assert!(store.record(&entry()).await.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn wait_times_out() {
        let store = TestAttemptStore::new();
        let result = store.wait_for_count(1, Duration::from_millis(20)).await;
        assert!(result.is_err());
    }
}
