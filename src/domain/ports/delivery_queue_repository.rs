use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{DeliveryStatus, QueueStats, QueuedNotification};
use crate::domain::errors::DeliveryResult;

/// Storage for queued notifications. Implementations hold no business rules;
/// every write refreshes `updated_at`.
#[async_trait]
pub trait DeliveryQueueRepository: Send + Sync {
    async fn create(&self, notification: &QueuedNotification) -> DeliveryResult<()>;
    async fn get_by_id(&self, id: &str) -> DeliveryResult<QueuedNotification>;

    /// Up to `limit` pending rows, in no particular order.
    async fn get_pending_notifications(&self, limit: usize)
        -> DeliveryResult<Vec<QueuedNotification>>;

    /// Rows due for processing at `now`, highest priority first, FIFO within a priority.
    async fn get_pending_by_priority(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>>;

    /// Failed or retrying rows that still have attempts left. `Failed` rows come
    /// first, oldest update first, so rows still waiting out a backoff never
    /// crowd fresh failures out of a batch.
    async fn get_failed_notifications(&self, limit: usize)
        -> DeliveryResult<Vec<QueuedNotification>>;

    /// Failed or retrying rows whose attempts are used up.
    async fn get_exhausted_notifications(
        &self,
        limit: usize,
    ) -> DeliveryResult<Vec<QueuedNotification>>;

    async fn update(&self, notification: &QueuedNotification) -> DeliveryResult<()>;

    /// Partial update. `Failed` increments the attempt counter; `Some(error)` replaces `last_error`.
    async fn update_status(
        &self,
        id: &str,
        status: DeliveryStatus,
        error_message: Option<&str>,
    ) -> DeliveryResult<()>;

    /// Moves a due pending or retrying row to `Processing` and returns the status
    /// it replaced. `None` when the row was already claimed, is no longer waiting,
    /// or has been rescheduled into the future.
    async fn claim_for_processing(&self, id: &str) -> DeliveryResult<Option<DeliveryStatus>>;

    /// Returns a claimed row to `status` with a new schedule, leaving attempts alone.
    async fn release_claim(
        &self,
        id: &str,
        status: DeliveryStatus,
        scheduled_at: DateTime<Utc>,
    ) -> DeliveryResult<()>;

    /// Puts rows stuck in `Processing` since before `older_than` back to `Pending`.
    async fn recover_stale_processing(&self, older_than: DateTime<Utc>) -> DeliveryResult<u64>;

    async fn delete(&self, id: &str) -> DeliveryResult<()>;

    /// Removes delivered rows last touched before `older_than`.
    async fn delete_processed_notifications(&self, older_than: DateTime<Utc>)
        -> DeliveryResult<u64>;

    async fn get_pending_count(&self) -> DeliveryResult<u64>;
    async fn get_queue_stats(&self) -> DeliveryResult<QueueStats>;
}
