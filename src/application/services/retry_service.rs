use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::entities::{
    default_channel_retry_settings, to_chrono, NotificationChannel, RetryConfiguration,
    RetrySettings,
};
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::{RetryConfigurationRepository, TimeService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRetryConfigurationRequest {
    pub channel: Option<NotificationChannel>,
    #[serde(flatten)]
    pub settings: RetrySettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRetryConfigurationRequest {
    pub max_retry_attempts: Option<u32>,
    pub initial_retry_delay: Option<Duration>,
    pub max_retry_delay: Option<Duration>,
    pub retry_delay_multiplier: Option<f64>,
    pub retry_timeout_duration: Option<Duration>,
    pub enable_exponential_backoff: Option<bool>,
    pub enable_dead_letter_queue: Option<bool>,
}

impl UpdateRetryConfigurationRequest {
    fn apply(&self, current: &RetrySettings) -> RetrySettings {
        RetrySettings {
            max_retry_attempts: self.max_retry_attempts.unwrap_or(current.max_retry_attempts),
            initial_retry_delay: self.initial_retry_delay.unwrap_or(current.initial_retry_delay),
            max_retry_delay: self.max_retry_delay.unwrap_or(current.max_retry_delay),
            retry_delay_multiplier: self
                .retry_delay_multiplier
                .unwrap_or(current.retry_delay_multiplier),
            retry_timeout_duration: self
                .retry_timeout_duration
                .unwrap_or(current.retry_timeout_duration),
            enable_exponential_backoff: self
                .enable_exponential_backoff
                .unwrap_or(current.enable_exponential_backoff),
            enable_dead_letter_queue: self
                .enable_dead_letter_queue
                .unwrap_or(current.enable_dead_letter_queue),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRetryRequest {
    pub notification_id: String,
    pub channel: NotificationChannel,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// Outcome of evaluating a failed notification against its channel's policy.
#[derive(Debug, Clone, Serialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    pub retry_delay: Duration,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub send_to_dead_letter: bool,
    pub retry_configuration: RetryConfiguration,
}

/// Retry policy lookups and the backoff arithmetic built on them.
pub struct RetryService {
    repo: Arc<dyn RetryConfigurationRepository>,
    clock: Arc<dyn TimeService>,
}

impl RetryService {
    pub fn new(repo: Arc<dyn RetryConfigurationRepository>, clock: Arc<dyn TimeService>) -> Self {
        Self { repo, clock }
    }

    pub async fn create_retry_configuration(
        &self,
        request: CreateRetryConfigurationRequest,
    ) -> DeliveryResult<RetryConfiguration> {
        let mut config = RetryConfiguration::new(request.channel, request.settings)?;
        let now = self.clock.now();
        config.created_at = now;
        config.updated_at = now;
        self.repo.create(&config).await?;
        info!(
            "Retry configuration {} created for {}",
            config.id,
            describe(config.channel)
        );
        Ok(config)
    }

    pub async fn get_retry_configuration(&self, id: &str) -> DeliveryResult<RetryConfiguration> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| DeliveryError::NotFound(format!("retry configuration {}", id)))
    }

    /// Channel row, then the global row, then the built-in fallback. Inactive rows
    /// are still returned so that deactivation stops retries for that channel.
    pub async fn get_retry_configuration_by_channel(
        &self,
        channel: NotificationChannel,
    ) -> DeliveryResult<RetryConfiguration> {
        if let Some(config) = self.repo.get_by_channel(Some(channel)).await? {
            return Ok(config);
        }
        match self.repo.get_by_channel(None).await? {
            Some(global) if global.is_active => Ok(global),
            _ => {
                debug!("No retry configuration for {}, using fallback", channel);
                Ok(RetryConfiguration::fallback())
            }
        }
    }

    pub async fn update_retry_configuration(
        &self,
        id: &str,
        request: UpdateRetryConfigurationRequest,
    ) -> DeliveryResult<RetryConfiguration> {
        let mut config = self.get_retry_configuration(id).await?;
        config.update(request.apply(&config.settings))?;
        config.updated_at = self.clock.now();
        self.repo.update(&config).await?;
        info!("Retry configuration {} updated", id);
        Ok(config)
    }

    pub async fn activate_retry_configuration(&self, id: &str) -> DeliveryResult<()> {
        let mut config = self.get_retry_configuration(id).await?;
        config.activate()?;
        self.repo.update(&config).await?;
        info!("Retry configuration {} activated", id);
        Ok(())
    }

    pub async fn deactivate_retry_configuration(&self, id: &str) -> DeliveryResult<()> {
        let mut config = self.get_retry_configuration(id).await?;
        config.deactivate()?;
        self.repo.update(&config).await?;
        info!("Retry configuration {} deactivated", id);
        Ok(())
    }

    pub async fn delete_retry_configuration(&self, id: &str) -> DeliveryResult<()> {
        self.repo.delete(id).await?;
        info!("Retry configuration {} deleted", id);
        Ok(())
    }

    pub async fn list_active_retry_configurations(&self) -> DeliveryResult<Vec<RetryConfiguration>> {
        self.repo.list_active().await
    }

    /// Seeds one configuration per channel, skipping channels that already have one.
    pub async fn initialize_default_retry_configurations(&self) -> DeliveryResult<usize> {
        let mut created = 0;
        for (channel, settings) in default_channel_retry_settings() {
            if self.repo.get_by_channel(Some(channel)).await?.is_some() {
                continue;
            }
            self.create_retry_configuration(CreateRetryConfigurationRequest {
                channel: Some(channel),
                settings,
            })
            .await?;
            created += 1;
        }
        Ok(created)
    }

    pub async fn calculate_retry_delay(
        &self,
        channel: NotificationChannel,
        attempt_number: u32,
    ) -> DeliveryResult<Duration> {
        if attempt_number == 0 {
            return Err(DeliveryError::InvalidArgument(
                "attempt number must be at least 1".to_string(),
            ));
        }
        let config = self.get_retry_configuration_by_channel(channel).await?;
        config.calculate_retry_delay(attempt_number)
    }

    pub async fn should_retry_notification(
        &self,
        channel: NotificationChannel,
        attempt_count: u32,
        last_error: Option<&str>,
    ) -> DeliveryResult<bool> {
        let config = self.get_retry_configuration_by_channel(channel).await?;
        Ok(config.should_retry(attempt_count, last_error))
    }

    /// `attempt_count` is the number of attempts already made, so the next
    /// delay is computed for attempt `attempt_count` of the retry sequence.
    pub async fn process_retryable_notification(
        &self,
        request: &ProcessRetryRequest,
    ) -> DeliveryResult<RetryDecision> {
        if request.attempt_count == 0 {
            return Err(DeliveryError::InvalidArgument(format!(
                "notification {} has no failed attempt to retry",
                request.notification_id
            )));
        }

        let config = self.get_retry_configuration_by_channel(request.channel).await?;
        let should_retry = config.should_retry(request.attempt_count, request.last_error.as_deref());

        if should_retry {
            let delay = config.calculate_retry_delay(request.attempt_count)?;
            debug!(
                "Notification {} will retry in {:?} (attempt {})",
                request.notification_id, delay, request.attempt_count
            );
            return Ok(RetryDecision {
                should_retry: true,
                retry_delay: delay,
                next_attempt_at: Some(self.clock.now() + to_chrono(delay)),
                send_to_dead_letter: false,
                retry_configuration: config,
            });
        }

        Ok(RetryDecision {
            should_retry: false,
            retry_delay: Duration::ZERO,
            next_attempt_at: None,
            send_to_dead_letter: config.settings.enable_dead_letter_queue,
            retry_configuration: config,
        })
    }
}

fn describe(channel: Option<NotificationChannel>) -> String {
    channel
        .map(|c| c.to_string())
        .unwrap_or_else(|| "all channels".to_string())
}
