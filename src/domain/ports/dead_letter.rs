use async_trait::async_trait;

use crate::domain::entities::{DeadLetterEntry, QueuedNotification};
use crate::domain::errors::DeliveryResult;

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn push(&self, notification: &QueuedNotification, reason: &str) -> DeliveryResult<()>;
    async fn list(&self, limit: usize) -> DeliveryResult<Vec<DeadLetterEntry>>;
}
