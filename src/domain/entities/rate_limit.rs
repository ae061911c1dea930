use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{to_chrono, NotificationChannel};
use crate::domain::errors::{DeliveryError, DeliveryResult};

/// Admission rule for one channel: at most `max_requests` per key in each `window_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub channel: NotificationChannel,
    pub max_requests: u32,
    pub window_size: Duration,
    /// Reported only; admission is decided by `max_requests`.
    pub burst_limit: u32,
}

impl RateLimitRule {
    pub fn new(channel: NotificationChannel, max_requests: u32, window_size: Duration) -> Self {
        Self {
            channel,
            max_requests,
            window_size,
            burst_limit: 0,
        }
    }

    pub fn with_burst_limit(mut self, burst_limit: u32) -> Self {
        self.burst_limit = burst_limit;
        self
    }

    pub fn validate(&self) -> DeliveryResult<()> {
        if self.max_requests == 0 {
            return Err(DeliveryError::InvalidArgument(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_size.is_zero() {
            return Err(DeliveryError::InvalidArgument(
                "window_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rules the engine starts with for each channel.
pub fn default_rate_limit_rules() -> Vec<RateLimitRule> {
    let minute = Duration::from_secs(60);
    vec![
        RateLimitRule::new(NotificationChannel::ChatBot, 30, minute).with_burst_limit(5),
        RateLimitRule::new(NotificationChannel::Email, 10, minute).with_burst_limit(3),
        RateLimitRule::new(NotificationChannel::TeamChat, 50, minute).with_burst_limit(10),
        RateLimitRule::new(NotificationChannel::Webhook, 100, minute).with_burst_limit(20),
    ]
}

/// Fixed-window counter for one (key, channel) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub last_request: DateTime<Utc>,
}

impl RateLimitEntry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_request: now,
        }
    }

    pub fn is_window_expired(&self, window: Duration, now: DateTime<Utc>) -> bool {
        now - self.window_start >= to_chrono(window)
    }

    pub fn reset_window(&mut self, now: DateTime<Utc>) {
        self.count = 0;
        self.window_start = now;
    }

    pub fn window_end(&self, window: Duration) -> DateTime<Utc> {
        self.window_start + to_chrono(window)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub channel: NotificationChannel,
    pub rule: Option<RateLimitRule>,
    pub active_entries: usize,
}
