use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::Notify, time::error::Elapsed};

use super::{DeadLetter, DeadLetterRouter};
use crate::error::BusError;

/// Collects dead letters in memory for inspection
#[derive(Debug, Clone, Default)]
pub struct MemoryDeadLetterRouter {
    letters: Arc<Mutex<Vec<DeadLetter>>>,
    notify: Arc<Notify>,
}

impl MemoryDeadLetterRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }

    /// Wait until at least `expected` letters have been routed
    ///
    /// # Errors
    /// Returns an error if the timeout is reached first
    pub async fn wait_for_count(&self, expected: usize, timeout: Duration) -> Result<(), Elapsed> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
    }
}

#[async_trait]
impl DeadLetterRouter for MemoryDeadLetterRouter {
    async fn route(&self, dead_letter: DeadLetter) -> Result<(), BusError> {
        self.letters.lock().push(dead_letter);
        self.notify.notify_waiters();
        Ok(())
    }
}
