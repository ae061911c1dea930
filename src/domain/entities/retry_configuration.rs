use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::NotificationChannel;
use crate::domain::errors::{DeliveryError, DeliveryResult};

pub const MAX_RETRY_ATTEMPTS_LIMIT: u32 = 10;

/// Error fragments that mark a failure as permanent. Matched case-insensitively.
const PERMANENT_ERROR_MARKERS: [&str; 6] = [
    "invalid recipient",
    "invalid message",
    "invalid chat id",
    "forbidden",
    "unauthorized",
    "not found",
];

/// The numeric knobs of a retry policy, shared by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retry_attempts: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_delay_multiplier: f64,
    pub retry_timeout_duration: Duration,
    pub enable_exponential_backoff: bool,
    pub enable_dead_letter_queue: bool,
}

impl RetrySettings {
    pub fn validate(&self) -> DeliveryResult<()> {
        if self.max_retry_attempts > MAX_RETRY_ATTEMPTS_LIMIT {
            return Err(DeliveryError::InvalidArgument(format!(
                "max retry attempts must be between 0 and {}",
                MAX_RETRY_ATTEMPTS_LIMIT
            )));
        }
        if self.max_retry_delay < self.initial_retry_delay {
            return Err(DeliveryError::InvalidArgument(
                "max retry delay must be greater than or equal to initial delay".to_string(),
            ));
        }
        if !self.retry_delay_multiplier.is_finite() || self.retry_delay_multiplier < 1.0 {
            return Err(DeliveryError::InvalidArgument(
                "retry delay multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_secs(30),
            max_retry_delay: Duration::from_secs(5 * 60),
            retry_delay_multiplier: 2.0,
            retry_timeout_duration: Duration::from_secs(30 * 60),
            enable_exponential_backoff: true,
            enable_dead_letter_queue: true,
        }
    }
}

/// Retry policy for one channel, or the global fallback when `channel` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfiguration {
    pub id: String,
    pub channel: Option<NotificationChannel>,
    #[serde(flatten)]
    pub settings: RetrySettings,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetryConfiguration {
    pub fn new(
        channel: Option<NotificationChannel>,
        settings: RetrySettings,
    ) -> DeliveryResult<Self> {
        settings.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            channel,
            settings,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Hard-coded policy used when nothing is configured.
    pub fn fallback() -> Self {
        let now = Utc::now();
        Self {
            id: "default".to_string(),
            channel: None,
            settings: RetrySettings::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Delay before the 1-indexed `attempt_number`-th attempt.
    pub fn calculate_retry_delay(&self, attempt_number: u32) -> DeliveryResult<Duration> {
        if attempt_number == 0 {
            return Err(DeliveryError::InvalidArgument(
                "attempt number must be at least 1".to_string(),
            ));
        }
        let s = &self.settings;
        if !s.enable_exponential_backoff {
            return Ok(s.initial_retry_delay);
        }

        let exponent = (attempt_number - 1).min(i32::MAX as u32) as i32;
        let secs = s.initial_retry_delay.as_secs_f64() * s.retry_delay_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= s.max_retry_delay.as_secs_f64() {
            return Ok(s.max_retry_delay);
        }
        Ok(Duration::from_secs_f64(secs))
    }

    pub fn should_retry(&self, attempt_count: u32, last_error: Option<&str>) -> bool {
        if !self.is_active || attempt_count >= self.settings.max_retry_attempts {
            return false;
        }
        !last_error.map(is_permanent_error).unwrap_or(false)
    }

    pub fn update(&mut self, settings: RetrySettings) -> DeliveryResult<()> {
        settings.validate()?;
        self.settings = settings;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn activate(&mut self) -> DeliveryResult<()> {
        if self.is_active {
            return Err(DeliveryError::Conflict(format!(
                "retry configuration {} is already active",
                self.id
            )));
        }
        self.is_active = true;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn deactivate(&mut self) -> DeliveryResult<()> {
        if !self.is_active {
            return Err(DeliveryError::Conflict(format!(
                "retry configuration {} is already inactive",
                self.id
            )));
        }
        self.is_active = false;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Whether a delivery error describes a failure retrying cannot fix.
pub fn is_permanent_error(error: &str) -> bool {
    let error = error.to_lowercase();
    PERMANENT_ERROR_MARKERS
        .iter()
        .any(|marker| error.contains(marker))
}

/// Per-channel policies seeded by `initialize_default_retry_configurations`.
pub fn default_channel_retry_settings() -> Vec<(NotificationChannel, RetrySettings)> {
    let policy = |attempts: u32, initial: u64, max: u64, multiplier: f64| RetrySettings {
        max_retry_attempts: attempts,
        initial_retry_delay: Duration::from_secs(initial),
        max_retry_delay: Duration::from_secs(max),
        retry_delay_multiplier: multiplier,
        ..RetrySettings::default()
    };
    vec![
        (NotificationChannel::ChatBot, policy(3, 30, 300, 2.0)),
        (NotificationChannel::Email, policy(5, 60, 600, 1.5)),
        (NotificationChannel::TeamChat, policy(3, 30, 300, 2.0)),
        (NotificationChannel::Webhook, policy(3, 15, 120, 2.0)),
    ]
}
