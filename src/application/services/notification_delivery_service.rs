use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry_service::{ProcessRetryRequest, RetryService};
use crate::domain::entities::{
    to_chrono, DeliveryStatus, NotificationChannel, QueueStats, QueuedNotification,
};
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::{
    DeadLetterSink, DeliveryChannel, DeliveryQueueRepository, RateLimiter, TimeService,
};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Counts from one `process_queue` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub errors: usize,
    pub cancelled: bool,
}

/// Counts from one `process_retry_queue` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryReport {
    pub scheduled: usize,
    pub expired: usize,
    pub dead_lettered: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub cancelled: bool,
}

enum ItemOutcome {
    Delivered,
    Failed,
    Deferred,
    Skipped,
    Cancelled,
}

/// Drives queued notifications through rate limiting, dispatch and retry.
pub struct NotificationDeliveryService {
    queue: Arc<dyn DeliveryQueueRepository>,
    rate_limiter: Arc<dyn RateLimiter>,
    retry_service: Arc<RetryService>,
    dead_letters: Arc<dyn DeadLetterSink>,
    clock: Arc<dyn TimeService>,
    channels: RwLock<HashMap<NotificationChannel, Arc<dyn DeliveryChannel>>>,
    send_timeout: Duration,
}

impl NotificationDeliveryService {
    pub fn new(
        queue: Arc<dyn DeliveryQueueRepository>,
        rate_limiter: Arc<dyn RateLimiter>,
        retry_service: Arc<RetryService>,
        dead_letters: Arc<dyn DeadLetterSink>,
        clock: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            queue,
            rate_limiter,
            retry_service,
            dead_letters,
            clock,
            channels: RwLock::new(HashMap::new()),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.rate_limiter
    }

    pub fn retry_service(&self) -> &Arc<RetryService> {
        &self.retry_service
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterSink> {
        &self.dead_letters
    }

    /// Validates and stores a notification as `Pending`, returning its id.
    ///
    /// Creation time comes from the service clock. An explicit schedule still in
    /// the future is kept; otherwise the notification is due immediately.
    pub async fn queue_notification(
        &self,
        mut notification: QueuedNotification,
    ) -> DeliveryResult<String> {
        validate_content(&notification.recipient, &notification.message)?;

        let now = self.clock.now();
        // `new` stamps both fields with the same instant; a difference means the
        // caller picked a schedule.
        let deferred = notification.scheduled_at != notification.created_at
            && notification.scheduled_at > now;
        notification.status = DeliveryStatus::Pending;
        notification.attempt_count = 0;
        notification.last_error = None;
        notification.created_at = now;
        notification.updated_at = now;
        if !deferred {
            notification.scheduled_at = now;
        }

        self.queue.create(&notification).await?;
        metrics::counter!("notifier_enqueued_total", "channel" => notification.channel.as_str())
            .increment(1);
        debug!(
            "Queued notification {} for {} via {} (priority {})",
            notification.id, notification.recipient, notification.channel, notification.priority
        );
        Ok(notification.id)
    }

    pub async fn get_notification(&self, id: &str) -> DeliveryResult<QueuedNotification> {
        self.queue.get_by_id(id).await
    }

    /// Processes up to `batch_size` due notifications in priority order.
    ///
    /// A failure on one item is recorded on that item and the batch moves on.
    /// Cancellation stops the batch before the next item and reverts an
    /// in-flight claim.
    pub async fn process_queue(
        &self,
        cancel: &CancellationToken,
        batch_size: usize,
    ) -> DeliveryResult<BatchReport> {
        let mut report = BatchReport::default();
        if cancel.is_cancelled() {
            report.cancelled = true;
            return Ok(report);
        }

        let batch = self
            .queue
            .get_pending_by_priority(self.clock.now(), batch_size)
            .await?;
        report.fetched = batch.len();

        for notification in batch {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.process_one(&notification, cancel).await {
                Ok(ItemOutcome::Delivered) => report.delivered += 1,
                Ok(ItemOutcome::Failed) => report.failed += 1,
                Ok(ItemOutcome::Deferred) => report.deferred += 1,
                Ok(ItemOutcome::Skipped) => report.skipped += 1,
                Ok(ItemOutcome::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("Notification {} could not be processed: {}", notification.id, e);
                    report.errors += 1;
                }
            }
        }

        if report.fetched > 0 {
            info!(
                "Queue batch: {} fetched, {} delivered, {} failed, {} deferred",
                report.fetched, report.delivered, report.failed, report.deferred
            );
        }
        Ok(report)
    }

    async fn process_one(
        &self,
        notification: &QueuedNotification,
        cancel: &CancellationToken,
    ) -> DeliveryResult<ItemOutcome> {
        let Some(previous_status) = self.queue.claim_for_processing(&notification.id).await? else {
            debug!("Notification {} already claimed or not due, skipping", notification.id);
            return Ok(ItemOutcome::Skipped);
        };
        let channel = notification.channel;

        if !self.rate_limiter.allow(&notification.recipient, channel).await {
            let delay = self
                .retry_service
                .calculate_retry_delay(channel, notification.attempt_count + 1)
                .await?;
            let next = self.clock.now() + to_chrono(delay);
            self.queue
                .release_claim(&notification.id, previous_status, next)
                .await?;
            metrics::counter!("notifier_rate_limited_total", "channel" => channel.as_str())
                .increment(1);
            debug!(
                "Notification {} rate limited on {}, deferred by {:?}",
                notification.id, channel, delay
            );
            return Ok(ItemOutcome::Deferred);
        }

        let result = self
            .dispatch(
                channel,
                &notification.recipient,
                &notification.subject,
                &notification.message,
                cancel,
            )
            .await;

        match result {
            Ok(message_id) => {
                self.queue
                    .update_status(&notification.id, DeliveryStatus::Delivered, None)
                    .await?;
                metrics::counter!("notifier_delivered_total", "channel" => channel.as_str())
                    .increment(1);
                info!(
                    "Notification {} delivered via {} (message id {})",
                    notification.id, channel, message_id
                );
                Ok(ItemOutcome::Delivered)
            }
            Err(DeliveryError::Cancelled) => {
                self.queue
                    .release_claim(&notification.id, previous_status, notification.scheduled_at)
                    .await?;
                info!("Notification {} released after cancellation", notification.id);
                Ok(ItemOutcome::Cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                self.queue
                    .update_status(&notification.id, DeliveryStatus::Failed, Some(&message))
                    .await?;
                metrics::counter!("notifier_failed_total", "channel" => channel.as_str())
                    .increment(1);
                warn!("Notification {} failed: {}", notification.id, message);
                Ok(ItemOutcome::Failed)
            }
        }
    }

    /// Resolves the adapter and sends under the send timeout and `cancel`.
    async fn dispatch(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        subject: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> DeliveryResult<String> {
        let adapter = self
            .channels
            .read()
            .await
            .get(&channel)
            .cloned()
            .ok_or(DeliveryError::ChannelNotRegistered(channel))?;

        if !adapter.is_available().await {
            return Err(DeliveryError::ChannelUnavailable(channel));
        }

        let send = tokio::time::timeout(self.send_timeout, adapter.send(recipient, subject, message));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
            result = send => match result {
                Ok(outcome) => outcome,
                Err(_) => Err(DeliveryError::DeliveryFailed(format!(
                    "send timed out after {:?}",
                    self.send_timeout
                ))),
            },
        }
    }

    /// Decides the fate of failed notifications: reschedule, or expire.
    ///
    /// Rows whose attempts are used up are expired first. Retryable `Failed` rows
    /// move to `Retrying` with a backoff schedule; `Retrying` rows already carry
    /// one and are only expired if the policy has since turned against them.
    pub async fn process_retry_queue(
        &self,
        cancel: &CancellationToken,
        batch_size: usize,
    ) -> DeliveryResult<RetryReport> {
        let mut report = RetryReport::default();

        let exhausted = self.queue.get_exhausted_notifications(batch_size).await?;
        for notification in exhausted {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            let reason = format!(
                "attempts exhausted ({}/{}): {}",
                notification.attempt_count,
                notification.max_attempts,
                notification.last_error.as_deref().unwrap_or("no error recorded")
            );
            let dead_letter = match self
                .retry_service
                .get_retry_configuration_by_channel(notification.channel)
                .await
            {
                Ok(config) => config.settings.enable_dead_letter_queue,
                Err(e) => {
                    error!("Retry configuration lookup failed: {}", e);
                    report.errors += 1;
                    continue;
                }
            };
            match self.expire(&notification, dead_letter, &reason).await {
                Ok(lettered) => {
                    report.expired += 1;
                    report.dead_lettered += usize::from(lettered);
                }
                Err(e) => {
                    error!("Notification {} could not be expired: {}", notification.id, e);
                    report.errors += 1;
                }
            }
        }

        let failed = self.queue.get_failed_notifications(batch_size).await?;
        for notification in failed {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.evaluate_retry(&notification).await {
                Ok(RetryOutcome::Scheduled) => report.scheduled += 1,
                Ok(RetryOutcome::Unchanged) => report.unchanged += 1,
                Ok(RetryOutcome::Expired { dead_lettered }) => {
                    report.expired += 1;
                    report.dead_lettered += usize::from(dead_lettered);
                }
                Err(e) => {
                    error!("Retry evaluation for {} failed: {}", notification.id, e);
                    report.errors += 1;
                }
            }
        }

        if report.scheduled + report.expired > 0 {
            info!(
                "Retry pass: {} rescheduled, {} expired, {} dead-lettered",
                report.scheduled, report.expired, report.dead_lettered
            );
        }
        Ok(report)
    }

    async fn evaluate_retry(&self, notification: &QueuedNotification) -> DeliveryResult<RetryOutcome> {
        let decision = self
            .retry_service
            .process_retryable_notification(&ProcessRetryRequest {
                notification_id: notification.id.clone(),
                channel: notification.channel,
                attempt_count: notification.attempt_count,
                last_error: notification.last_error.clone(),
            })
            .await?;

        if !decision.should_retry {
            let reason = format!(
                "retry policy declined after {} attempts: {}",
                notification.attempt_count,
                notification.last_error.as_deref().unwrap_or("no error recorded")
            );
            let dead_lettered = self
                .expire(notification, decision.send_to_dead_letter, &reason)
                .await?;
            return Ok(RetryOutcome::Expired { dead_lettered });
        }

        if notification.status == DeliveryStatus::Retrying {
            return Ok(RetryOutcome::Unchanged);
        }

        let mut rescheduled = notification.clone();
        rescheduled.schedule_retry(decision.retry_delay, self.clock.now());
        self.queue.update(&rescheduled).await?;
        debug!(
            "Notification {} rescheduled for {}",
            notification.id, rescheduled.scheduled_at
        );
        Ok(RetryOutcome::Scheduled)
    }

    /// Marks the row `Expired` and, when asked, hands it to the dead-letter sink.
    async fn expire(
        &self,
        notification: &QueuedNotification,
        dead_letter: bool,
        reason: &str,
    ) -> DeliveryResult<bool> {
        self.queue
            .update_status(&notification.id, DeliveryStatus::Expired, None)
            .await?;
        metrics::counter!("notifier_expired_total", "channel" => notification.channel.as_str())
            .increment(1);
        info!("Notification {} expired: {}", notification.id, reason);

        if !dead_letter {
            return Ok(false);
        }
        let mut expired = notification.clone();
        expired.mark_expired(self.clock.now());
        self.dead_letters.push(&expired, reason).await?;
        metrics::counter!("notifier_dead_lettered_total", "channel" => notification.channel.as_str())
            .increment(1);
        Ok(true)
    }

    /// Sends immediately, bypassing the queue. Errors go straight to the caller.
    pub async fn send_notification(
        &self,
        cancel: &CancellationToken,
        channel: NotificationChannel,
        recipient: &str,
        subject: &str,
        message: &str,
    ) -> DeliveryResult<String> {
        validate_content(recipient, message)?;
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }
        if !self.check_rate_limit(channel, recipient).await {
            metrics::counter!("notifier_rate_limited_total", "channel" => channel.as_str())
                .increment(1);
            return Err(DeliveryError::RateLimited {
                channel,
                recipient: recipient.to_string(),
            });
        }

        let message_id = self
            .dispatch(channel, recipient, subject, message, cancel)
            .await?;
        metrics::counter!("notifier_delivered_total", "channel" => channel.as_str()).increment(1);
        info!("Immediate notification to {} via {} sent", recipient, channel);
        Ok(message_id)
    }

    pub async fn check_rate_limit(&self, channel: NotificationChannel, recipient: &str) -> bool {
        self.rate_limiter.allow(recipient, channel).await
    }

    /// Installs `adapter` for its channel type, replacing any previous one.
    pub async fn register_delivery_channel(&self, adapter: Arc<dyn DeliveryChannel>) {
        let channel = adapter.channel_type();
        if self.channels.write().await.insert(channel, adapter).is_some() {
            warn!("Delivery channel {} replaced", channel);
        } else {
            info!("Delivery channel {} registered", channel);
        }
    }

    pub async fn unregister_delivery_channel(&self, channel: NotificationChannel) -> bool {
        let removed = self.channels.write().await.remove(&channel).is_some();
        if removed {
            info!("Delivery channel {} unregistered", channel);
        }
        removed
    }

    pub async fn registered_channels(&self) -> Vec<NotificationChannel> {
        let mut channels: Vec<NotificationChannel> =
            self.channels.read().await.keys().copied().collect();
        channels.sort();
        channels
    }

    pub async fn get_queue_stats(&self) -> DeliveryResult<QueueStats> {
        let mut stats = self.queue.get_queue_stats().await?;
        stats.pending_count = self.queue.get_pending_count().await?;
        Ok(stats)
    }

    /// Deletes delivered rows older than `retention`.
    pub async fn purge_delivered(&self, retention: Duration) -> DeliveryResult<u64> {
        let cutoff = self.clock.now() - to_chrono(retention);
        let removed = self.queue.delete_processed_notifications(cutoff).await?;
        if removed > 0 {
            info!("Purged {} delivered notifications", removed);
        }
        Ok(removed)
    }

    /// Returns rows stuck in `Processing` longer than `lock_timeout` to the queue.
    pub async fn recover_stale(&self, lock_timeout: Duration) -> DeliveryResult<u64> {
        let cutoff = self.clock.now() - to_chrono(lock_timeout);
        let recovered = self.queue.recover_stale_processing(cutoff).await?;
        if recovered > 0 {
            warn!("Recovered {} notifications stuck in processing", recovered);
        }
        Ok(recovered)
    }
}

enum RetryOutcome {
    Scheduled,
    Unchanged,
    Expired { dead_lettered: bool },
}

fn validate_content(recipient: &str, message: &str) -> DeliveryResult<()> {
    if recipient.trim().is_empty() {
        return Err(DeliveryError::InvalidArgument(
            "recipient cannot be empty".to_string(),
        ));
    }
    if message.trim().is_empty() {
        return Err(DeliveryError::InvalidArgument(
            "message cannot be empty".to_string(),
        ));
    }
    Ok(())
}
