use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{to_chrono, NotificationChannel};
use crate::domain::errors::DeliveryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    Retrying,
    Expired,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 6] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Processing,
        DeliveryStatus::Delivered,
        DeliveryStatus::Failed,
        DeliveryStatus::Retrying,
        DeliveryStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DeliveryError::InvalidArgument(format!("unknown delivery status: {}", s)))
    }
}

/// A single outbound message waiting in, or moving through, the delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedNotification {
    pub id: String,
    pub notification_id: Option<String>,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: String,
    pub message: String,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub status: DeliveryStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

impl QueuedNotification {
    pub fn new(
        channel: NotificationChannel,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            notification_id: None,
            channel,
            recipient: recipient.into(),
            subject: subject.into(),
            message: message.into(),
            priority: 0,
            scheduled_at: now,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            status: DeliveryStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_notification_id(mut self, notification_id: impl Into<String>) -> Self {
        self.notification_id = Some(notification_id.into());
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = at;
        self
    }

    /// Stamps creation time from an injected clock.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.status, DeliveryStatus::Failed | DeliveryStatus::Retrying)
            && self.attempt_count < self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.status, DeliveryStatus::Failed | DeliveryStatus::Retrying)
            && self.attempt_count >= self.max_attempts
    }

    /// Due for a send attempt: waiting (fresh or rescheduled) and its time has come.
    pub fn should_be_processed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, DeliveryStatus::Pending | DeliveryStatus::Retrying)
            && self.scheduled_at <= now
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Processing;
        self.updated_at = now;
    }

    /// Moves to `status`. Entering `Failed` counts an attempt; `error`, when
    /// given, replaces the last recorded one.
    pub fn record_status(&mut self, status: DeliveryStatus, error: Option<&str>, now: DateTime<Utc>) {
        self.status = status;
        if let Some(error) = error {
            self.last_error = Some(error.to_string());
        }
        if status == DeliveryStatus::Failed {
            self.attempt_count += 1;
        }
        self.updated_at = now;
    }

    /// Hands a claimed row back to `status` without counting an attempt.
    pub fn release(&mut self, status: DeliveryStatus, scheduled_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = status;
        self.scheduled_at = scheduled_at;
        self.updated_at = now;
    }

    pub fn schedule_retry(&mut self, delay: Duration, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Retrying;
        self.scheduled_at = now + to_chrono(delay);
        self.updated_at = now;
    }

    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Expired;
        self.updated_at = now;
    }
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub pending_count: u64,
    pub by_status: BTreeMap<String, u64>,
}

impl QueueStats {
    pub fn count(&self, status: DeliveryStatus) -> u64 {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}
