use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::application::services::NotificationDeliveryService;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub maintenance_interval: Duration,
    pub delivered_retention: Duration,
    pub processing_lock_timeout: Duration,
    pub rate_limit_entry_ttl: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval: Duration::from_secs(5),
            retry_interval: Duration::from_secs(30),
            maintenance_interval: Duration::from_secs(300),
            delivered_retention: Duration::from_secs(7 * 24 * 3600),
            processing_lock_timeout: Duration::from_secs(300),
            rate_limit_entry_ttl: Duration::from_secs(3600),
        }
    }
}

/// Background driver for the delivery service: queue passes, retry passes
/// and periodic maintenance, each on its own interval.
pub struct DeliveryWorker {
    service: Arc<NotificationDeliveryService>,
    settings: WorkerSettings,
}

/// Owner of a running worker. Dropping it does not stop the task; call `shutdown`.
pub struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the worker and waits for its current pass to wind down.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            error!("Delivery worker terminated abnormally: {}", e);
        }
    }
}

impl DeliveryWorker {
    pub fn new(service: Arc<NotificationDeliveryService>, settings: WorkerSettings) -> Self {
        Self { service, settings }
    }

    pub fn start(self) -> WorkerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        WorkerHandle { cancel, join }
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "Delivery worker started (poll every {:?}, retry every {:?}, maintenance every {:?})",
            self.settings.poll_interval,
            self.settings.retry_interval,
            self.settings.maintenance_interval
        );

        let mut poll = tokio::time::interval(self.settings.poll_interval);
        let mut retry = tokio::time::interval(self.settings.retry_interval);
        let mut maintenance = tokio::time::interval(self.settings.maintenance_interval);
        for ticker in [&mut poll, &mut retry, &mut maintenance] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = poll.tick() => self.queue_pass(&cancel).await,
                _ = retry.tick() => self.retry_pass(&cancel).await,
                _ = maintenance.tick() => self.run_maintenance().await,
            }
        }

        info!("Delivery worker stopped");
    }

    pub async fn queue_pass(&self, cancel: &CancellationToken) {
        if let Err(e) = self
            .service
            .process_queue(cancel, self.settings.batch_size)
            .await
        {
            error!("Queue pass failed: {}", e);
        }
    }

    pub async fn retry_pass(&self, cancel: &CancellationToken) {
        if let Err(e) = self
            .service
            .process_retry_queue(cancel, self.settings.batch_size)
            .await
        {
            error!("Retry pass failed: {}", e);
        }
    }

    /// Retention sweep, stale-claim recovery and rate-limit counter eviction.
    pub async fn run_maintenance(&self) {
        if let Err(e) = self
            .service
            .purge_delivered(self.settings.delivered_retention)
            .await
        {
            error!("Retention sweep failed: {}", e);
        }
        if let Err(e) = self
            .service
            .recover_stale(self.settings.processing_lock_timeout)
            .await
        {
            error!("Stale claim recovery failed: {}", e);
        }
        let evicted = self
            .service
            .rate_limiter()
            .evict_stale(self.settings.rate_limit_entry_ttl)
            .await;
        if evicted > 0 {
            info!("Evicted {} idle rate limit counters", evicted);
        }
    }
}
