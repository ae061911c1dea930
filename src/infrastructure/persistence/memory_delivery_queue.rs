use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entities::{DeliveryStatus, QueueStats, QueuedNotification};
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::{DeliveryQueueRepository, TimeService};
use crate::infrastructure::runtime::TokioTimeService;

/// Process-local queue store. One lock guards every read-modify-write.
#[derive(Clone)]
pub struct InMemoryDeliveryQueueRepository {
    notifications: Arc<RwLock<HashMap<String, QueuedNotification>>>,
    clock: Arc<dyn TimeService>,
}

impl InMemoryDeliveryQueueRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioTimeService::new()))
    }

    pub fn with_clock(clock: Arc<dyn TimeService>) -> Self {
        Self {
            notifications: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn not_found(id: &str) -> DeliveryError {
        DeliveryError::NotFound(format!("queued notification {}", id))
    }
}

impl Default for InMemoryDeliveryQueueRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_limited<'a>(
    rows: impl Iterator<Item = &'a QueuedNotification>,
    limit: usize,
) -> Vec<QueuedNotification> {
    rows.take(limit).cloned().collect()
}

#[async_trait]
impl DeliveryQueueRepository for InMemoryDeliveryQueueRepository {
    async fn create(&self, notification: &QueuedNotification) -> DeliveryResult<()> {
        let mut notifications = self.notifications.write().await;
        if notifications.contains_key(&notification.id) {
            return Err(DeliveryError::AlreadyExists(format!(
                "queued notification {}",
                notification.id
            )));
        }
        notifications.insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> DeliveryResult<QueuedNotification> {
        let notifications = self.notifications.read().await;
        notifications
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn get_pending_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        let notifications = self.notifications.read().await;
        Ok(collect_limited(
            notifications
                .values()
                .filter(|n| n.status == DeliveryStatus::Pending),
            limit,
        ))
    }

    async fn get_pending_by_priority(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        let notifications = self.notifications.read().await;
        let mut due: Vec<&QueuedNotification> = notifications
            .values()
            .filter(|n| n.should_be_processed(now))
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(collect_limited(due.into_iter(), limit))
    }

    async fn get_failed_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        let notifications = self.notifications.read().await;
        let mut failed: Vec<&QueuedNotification> =
            notifications.values().filter(|n| n.is_retryable()).collect();
        failed.sort_by_key(|n| (n.status != DeliveryStatus::Failed, n.updated_at));
        Ok(collect_limited(failed.into_iter(), limit))
    }

    async fn get_exhausted_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>> {
        let notifications = self.notifications.read().await;
        Ok(collect_limited(
            notifications.values().filter(|n| n.is_exhausted()),
            limit,
        ))
    }

    async fn update(&self, notification: &QueuedNotification) -> DeliveryResult<()> {
        let mut notifications = self.notifications.write().await;
        let slot = notifications
            .get_mut(&notification.id)
            .ok_or_else(|| Self::not_found(&notification.id))?;
        *slot = notification.clone();
        slot.updated_at = self.clock.now();
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> DeliveryResult<()> {
        let mut notifications = self.notifications.write().await;
        let n = notifications.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        n.record_status(status, error_message, self.clock.now());
        Ok(())
    }

    async fn claim_for_processing(&self, id: &str) -> DeliveryResult<Option<DeliveryStatus>> {
        let mut notifications = self.notifications.write().await;
        let n = notifications.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        let now = self.clock.now();
        if !n.should_be_processed(now) {
            return Ok(None);
        }
        let previous = n.status;
        n.mark_processing(now);
        Ok(Some(previous))
    }

    async fn release_claim(
        &self,
        id: &str,
        status: DeliveryStatus,
        scheduled_at: DateTime<Utc>,
    ) -> DeliveryResult<()> {
        let mut notifications = self.notifications.write().await;
        let n = notifications.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        n.release(status, scheduled_at, self.clock.now());
        Ok(())
    }

    async fn recover_stale_processing(&self, older_than: DateTime<Utc>) -> DeliveryResult<u64> {
        let mut notifications = self.notifications.write().await;
        let now = self.clock.now();
        let mut recovered = 0;
        for n in notifications.values_mut() {
            if n.status == DeliveryStatus::Processing && n.updated_at < older_than {
                n.status = DeliveryStatus::Pending;
                n.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn delete(&self, id: &str) -> DeliveryResult<()> {
        let mut notifications = self.notifications.write().await;
        notifications
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(id))
    }

    async fn delete_processed_notifications(
        &self,
        older_than: DateTime<Utc>,
    ) -> DeliveryResult<u64> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications
            .retain(|_, n| !(n.status == DeliveryStatus::Delivered && n.updated_at < older_than));
        Ok((before - notifications.len()) as u64)
    }

    async fn get_pending_count(&self) -> DeliveryResult<u64> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .values()
            .filter(|n| n.status == DeliveryStatus::Pending)
            .count() as u64)
    }

    async fn get_queue_stats(&self) -> DeliveryResult<QueueStats> {
        let notifications = self.notifications.read().await;
        let mut stats = QueueStats::default();
        for n in notifications.values() {
            *stats
                .by_status
                .entry(n.status.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats.pending_count = stats.count(DeliveryStatus::Pending);
        Ok(stats)
    }
}
