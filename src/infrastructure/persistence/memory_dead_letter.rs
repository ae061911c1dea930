use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::entities::{DeadLetterEntry, QueuedNotification};
use crate::domain::errors::DeliveryResult;
use crate::domain::ports::{DeadLetterSink, TimeService};
use crate::infrastructure::runtime::TokioTimeService;

const DEFAULT_CAPACITY: usize = 1000;

/// Bounded dead-letter list. The oldest entry is dropped once `capacity` is reached.
#[derive(Clone)]
pub struct InMemoryDeadLetterSink {
    entries: Arc<RwLock<VecDeque<DeadLetterEntry>>>,
    capacity: usize,
    clock: Arc<dyn TimeService>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, Arc::new(TokioTimeService::new()))
    }

    pub fn with_capacity(capacity: usize, clock: Arc<dyn TimeService>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryDeadLetterSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn push(&self, notification: &QueuedNotification, reason: &str) -> DeliveryResult<()> {
        warn!(
            "Notification {} dead-lettered after {} attempts on {}: {}",
            notification.id, notification.attempt_count, notification.channel, reason
        );

        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(DeadLetterEntry {
            notification: notification.clone(),
            reason: reason.to_string(),
            dead_lettered_at: self.clock.now(),
        });
        Ok(())
    }

    /// Most recent first.
    async fn list(&self, limit: usize) -> DeliveryResult<Vec<DeadLetterEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}
