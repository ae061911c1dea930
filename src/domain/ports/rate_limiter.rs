use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::entities::{NotificationChannel, RateLimitRule, RateLimitStats};
use crate::domain::errors::DeliveryResult;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Admits and counts one request, or refuses it without counting.
    async fn allow(&self, key: &str, channel: NotificationChannel) -> bool;
    async fn get_remaining_requests(&self, key: &str, channel: NotificationChannel) -> u32;
    async fn get_reset_time(&self, key: &str, channel: NotificationChannel) -> DateTime<Utc>;

    async fn set_rule(&self, rule: RateLimitRule) -> DeliveryResult<()>;
    async fn get_rule(&self, channel: NotificationChannel) -> Option<RateLimitRule>;
    async fn remove_rule(&self, channel: NotificationChannel) -> bool;

    async fn reset(&self, key: &str, channel: NotificationChannel);
    async fn get_stats(&self, channel: NotificationChannel) -> RateLimitStats;

    /// Drops counters whose window has closed and that saw no traffic for `idle_for`.
    async fn evict_stale(&self, idle_for: Duration) -> usize;
}
