use async_trait::async_trait;

use crate::domain::entities::{NotificationChannel, RetryConfiguration};
use crate::domain::errors::DeliveryResult;

#[async_trait]
pub trait RetryConfigurationRepository: Send + Sync {
    async fn create(&self, config: &RetryConfiguration) -> DeliveryResult<()>;
    async fn get_by_id(&self, id: &str) -> DeliveryResult<Option<RetryConfiguration>>;
    /// `None` looks up the global row.
    async fn get_by_channel(
        &self,
        channel: Option<NotificationChannel>,
    ) -> DeliveryResult<Option<RetryConfiguration>>;
    async fn update(&self, config: &RetryConfiguration) -> DeliveryResult<()>;
    async fn delete(&self, id: &str) -> DeliveryResult<()>;
    async fn list_active(&self) -> DeliveryResult<Vec<RetryConfiguration>>;
}
