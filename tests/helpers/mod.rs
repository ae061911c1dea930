#![allow(dead_code)]
pub mod channels;

pub use channels::*;

use chrono::{TimeZone, Utc};
use notifier::application::services::{NotificationDeliveryService, RetryService};
use notifier::domain::ports::{DeliveryQueueRepository, TimeService};
use notifier::infrastructure::persistence::{
    InMemoryDeadLetterSink, InMemoryDeliveryQueueRepository, InMemoryRetryConfigurationRepository,
};
use notifier::infrastructure::rate_limiter::InMemoryRateLimiter;
use notifier::infrastructure::runtime::ManualTimeService;
use std::sync::Arc;

/// Service plus handles on the pieces tests poke at directly.
pub struct TestEngine {
    pub service: Arc<NotificationDeliveryService>,
    pub clock: ManualTimeService,
    pub dead_letters: Arc<InMemoryDeadLetterSink>,
}

pub fn test_clock() -> ManualTimeService {
    ManualTimeService::new(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap())
}

/// In-memory engine on a manual clock, default retry policies installed.
pub async fn setup_engine() -> TestEngine {
    let clock = test_clock();
    let queue = Arc::new(InMemoryDeliveryQueueRepository::with_clock(Arc::new(
        clock.clone(),
    )));
    setup_engine_with_queue(queue, clock).await
}

pub async fn setup_engine_with_queue(
    queue: Arc<dyn DeliveryQueueRepository>,
    clock: ManualTimeService,
) -> TestEngine {
    let time: Arc<dyn TimeService> = Arc::new(clock.clone());
    let retry_service = Arc::new(RetryService::new(
        Arc::new(InMemoryRetryConfigurationRepository::new()),
        time.clone(),
    ));
    retry_service
        .initialize_default_retry_configurations()
        .await
        .expect("default retry configurations");

    let dead_letters = Arc::new(InMemoryDeadLetterSink::with_capacity(100, time.clone()));
    let service = NotificationDeliveryService::new(
        queue,
        Arc::new(InMemoryRateLimiter::with_clock(time.clone())),
        retry_service,
        dead_letters.clone(),
        time,
    );

    TestEngine {
        service: Arc::new(service),
        clock,
        dead_letters,
    }
}
