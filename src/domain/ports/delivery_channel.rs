use async_trait::async_trait;
use std::time::Duration;

use crate::domain::entities::NotificationChannel;
use crate::domain::errors::DeliveryResult;

/// One outbound transport (chat bot, SMTP, team chat, webhook).
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Sends one message and returns the transport's message id.
    async fn send(&self, recipient: &str, subject: &str, message: &str) -> DeliveryResult<String>;

    fn channel_type(&self) -> NotificationChannel;

    /// Cheap liveness probe, checked before every send.
    async fn is_available(&self) -> bool;

    fn max_retries(&self) -> u32;

    /// Advisory `(max_requests, window)` used to seed the rate limiter.
    fn rate_limit_info(&self) -> (u32, Duration);
}
