//! Queue-to-channel delivery: enqueue, dispatch, failure recording and
//! the Failed -> Retrying -> Expired lifecycle.

mod helpers;

use helpers::*;
use notifier::domain::entities::{DeliveryStatus, NotificationChannel, QueuedNotification};
use notifier::domain::errors::DeliveryError;
use notifier::domain::ports::DeadLetterSink;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn chat(recipient: &str, message: &str) -> QueuedNotification {
    QueuedNotification::new(NotificationChannel::ChatBot, recipient, "Build", message)
}

#[tokio::test]
async fn test_queued_notification_is_delivered() {
    let engine = setup_engine().await;
    let channel = ScriptedChannel::succeeding(NotificationChannel::ChatBot);
    engine.service.register_delivery_channel(channel.clone()).await;

    let id = assert_ok!(
        engine
            .service
            .queue_notification(chat("123", "build ok").with_priority(1).with_max_attempts(3))
            .await
    );

    let report = assert_ok!(
        engine
            .service
            .process_queue(&CancellationToken::new(), 10)
            .await
    );
    assert_eq!(report.fetched, 1);
    assert_eq!(report.delivered, 1);

    let stored = engine.service.get_notification(&id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Delivered);
    assert_eq!(stored.attempt_count, 0);
    assert_eq!(channel.recipients(), vec!["123".to_string()]);
}

#[tokio::test]
async fn test_failing_channel_retries_then_expires() {
    let engine = setup_engine().await;
    engine
        .service
        .register_delivery_channel(ScriptedChannel::failing(NotificationChannel::ChatBot))
        .await;
    let cancel = CancellationToken::new();

    let id = engine
        .service
        .queue_notification(chat("123", "deploy failed").with_max_attempts(2))
        .await
        .unwrap();

    // Round one: send fails, retry pass reschedules with backoff.
    let report = engine.service.process_queue(&cancel, 10).await.unwrap();
    assert_eq!(report.failed, 1);
    let stored = engine.service.get_notification(&id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempt_count, 1);
    assert!(stored.last_error.as_deref().unwrap().contains("connection refused"));

    let retry = engine.service.process_retry_queue(&cancel, 10).await.unwrap();
    assert_eq!(retry.scheduled, 1);
    let stored = engine.service.get_notification(&id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Retrying);
    assert_eq!(
        stored.scheduled_at,
        engine_now(&engine) + chrono::Duration::seconds(30)
    );

    // Not due yet: nothing is fetched.
    let report = engine.service.process_queue(&cancel, 10).await.unwrap();
    assert_eq!(report.fetched, 0);

    // Round two: past the backoff, the second failure exhausts the budget.
    engine.clock.advance(Duration::from_secs(31));
    let report = engine.service.process_queue(&cancel, 10).await.unwrap();
    assert_eq!(report.failed, 1);

    let retry = engine.service.process_retry_queue(&cancel, 10).await.unwrap();
    assert_eq!(retry.expired, 1);
    assert_eq!(retry.dead_lettered, 1);

    let stored = engine.service.get_notification(&id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Expired);
    assert_eq!(stored.attempt_count, 2);

    let letters = engine.dead_letters.list(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].notification.id, id);
    assert!(letters[0].reason.contains("attempts exhausted"));
}

fn engine_now(engine: &TestEngine) -> chrono::DateTime<chrono::Utc> {
    use notifier::domain::ports::TimeService;
    engine.clock.now()
}

#[tokio::test]
async fn test_batch_follows_priority_then_age() {
    let engine = setup_engine().await;
    let channel = ScriptedChannel::succeeding(NotificationChannel::ChatBot);
    engine.service.register_delivery_channel(channel.clone()).await;

    engine
        .service
        .queue_notification(chat("A", "low").with_priority(1))
        .await
        .unwrap();
    engine
        .service
        .queue_notification(chat("C", "high, older").with_priority(5))
        .await
        .unwrap();
    engine.clock.advance(Duration::from_secs(1));
    engine
        .service
        .queue_notification(chat("B", "high, newer").with_priority(5))
        .await
        .unwrap();

    let report = engine
        .service
        .process_queue(&CancellationToken::new(), 10)
        .await
        .unwrap();
    assert_eq!(report.delivered, 3);
    assert_eq!(channel.recipients(), vec!["C", "B", "A"]);
}

#[tokio::test]
async fn test_one_bad_item_does_not_stop_the_batch() {
    let engine = setup_engine().await;
    let channel = ScriptedChannel::new(
        NotificationChannel::ChatBot,
        Script::FailFor(vec!["bad"]),
    );
    engine.service.register_delivery_channel(channel.clone()).await;

    let good_before = engine
        .service
        .queue_notification(chat("good-1", "one").with_priority(3))
        .await
        .unwrap();
    let bad = engine
        .service
        .queue_notification(chat("bad", "two").with_priority(2))
        .await
        .unwrap();
    let good_after = engine
        .service
        .queue_notification(chat("good-2", "three").with_priority(1))
        .await
        .unwrap();

    let report = engine
        .service
        .process_queue(&CancellationToken::new(), 10)
        .await
        .unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(channel.calls(), 3);

    for id in [&good_before, &good_after] {
        let stored = engine.service.get_notification(id).await.unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);
    }
    let stored = engine.service.get_notification(&bad).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert!(stored.last_error.unwrap().contains("adapter crashed"));
}

#[tokio::test]
async fn test_missing_or_unavailable_channel_fails_the_item() {
    let engine = setup_engine().await;
    let email = ScriptedChannel::succeeding(NotificationChannel::Email);
    email.set_available(false);
    engine.service.register_delivery_channel(email.clone()).await;

    let unregistered = engine
        .service
        .queue_notification(QueuedNotification::new(
            NotificationChannel::Webhook,
            "https://hooks.example.com/a",
            "Ping",
            "hello",
        ))
        .await
        .unwrap();
    let unavailable = engine
        .service
        .queue_notification(QueuedNotification::new(
            NotificationChannel::Email,
            "ops@example.com",
            "Ping",
            "hello",
        ))
        .await
        .unwrap();

    let report = engine
        .service
        .process_queue(&CancellationToken::new(), 10)
        .await
        .unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(email.calls(), 0);

    let stored = engine.service.get_notification(&unregistered).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert!(stored.last_error.unwrap().contains("No delivery channel registered"));

    let stored = engine.service.get_notification(&unavailable).await.unwrap();
    assert!(stored.last_error.unwrap().contains("not available"));
}

#[tokio::test]
async fn test_hung_send_times_out() {
    let engine = setup_engine().await;
    let service = std::sync::Arc::try_unwrap(engine.service)
        .ok()
        .expect("sole owner")
        .with_send_timeout(Duration::from_millis(50));
    service
        .register_delivery_channel(ScriptedChannel::new(NotificationChannel::ChatBot, Script::Hang))
        .await;

    let id = service.queue_notification(chat("123", "hello")).await.unwrap();
    let report = service
        .process_queue(&CancellationToken::new(), 10)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);

    let stored = service.get_notification(&id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert!(stored.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_queue_rejects_blank_content() {
    let engine = setup_engine().await;

    let err = assert_err!(engine.service.queue_notification(chat("  ", "hello")).await);
    assert!(matches!(err, DeliveryError::InvalidArgument(_)));

    let err = assert_err!(engine.service.queue_notification(chat("123", "\n")).await);
    assert!(matches!(err, DeliveryError::InvalidArgument(_)));

    let stats = engine.service.get_queue_stats().await.unwrap();
    assert_eq!(stats.pending_count, 0);
}

#[tokio::test]
async fn test_future_schedule_is_respected() {
    let engine = setup_engine().await;
    engine
        .service
        .register_delivery_channel(ScriptedChannel::succeeding(NotificationChannel::ChatBot))
        .await;

    let later = engine_now(&engine) + chrono::Duration::minutes(10);
    let id = engine
        .service
        .queue_notification(chat("123", "reminder").scheduled_at(later))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(engine.service.process_queue(&cancel, 10).await.unwrap().fetched, 0);

    engine.clock.advance(Duration::from_secs(600));
    assert_eq!(engine.service.process_queue(&cancel, 10).await.unwrap().delivered, 1);
    let stored = engine.service.get_notification(&id).await.unwrap();
    assert_eq!(stored.status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn test_send_notification_reports_errors_directly() {
    let engine = setup_engine().await;
    let cancel = CancellationToken::new();

    let err = engine
        .service
        .send_notification(&cancel, NotificationChannel::TeamChat, "#ops", "Hi", "there")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::ChannelNotRegistered(NotificationChannel::TeamChat)
    ));

    let team_chat = ScriptedChannel::succeeding(NotificationChannel::TeamChat);
    engine.service.register_delivery_channel(team_chat.clone()).await;
    let id = engine
        .service
        .send_notification(&cancel, NotificationChannel::TeamChat, "#ops", "Hi", "there")
        .await
        .unwrap();
    assert_eq!(id, "id-1");

    team_chat.set_available(false);
    let err = engine
        .service
        .send_notification(&cancel, NotificationChannel::TeamChat, "#ops", "Hi", "there")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::ChannelUnavailable(_)));

    let err = engine
        .service
        .send_notification(&cancel, NotificationChannel::TeamChat, "", "Hi", "there")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::InvalidArgument(_)));

    cancel.cancel();
    let err = engine
        .service
        .send_notification(&cancel, NotificationChannel::TeamChat, "#ops", "Hi", "there")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Cancelled));
}

#[tokio::test]
async fn test_channel_registry() {
    let engine = setup_engine().await;
    assert!(engine.service.registered_channels().await.is_empty());

    engine
        .service
        .register_delivery_channel(ScriptedChannel::succeeding(NotificationChannel::Webhook))
        .await;
    engine
        .service
        .register_delivery_channel(ScriptedChannel::succeeding(NotificationChannel::ChatBot))
        .await;
    // replacing keeps a single entry
    engine
        .service
        .register_delivery_channel(ScriptedChannel::failing(NotificationChannel::ChatBot))
        .await;
    assert_eq!(
        engine.service.registered_channels().await,
        vec![NotificationChannel::ChatBot, NotificationChannel::Webhook]
    );

    assert!(engine
        .service
        .unregister_delivery_channel(NotificationChannel::Webhook)
        .await);
    assert!(!engine
        .service
        .unregister_delivery_channel(NotificationChannel::Webhook)
        .await);
    assert_eq!(
        engine.service.registered_channels().await,
        vec![NotificationChannel::ChatBot]
    );
}

#[tokio::test]
async fn test_queue_stats_by_status() {
    let engine = setup_engine().await;
    engine
        .service
        .register_delivery_channel(ScriptedChannel::new(
            NotificationChannel::ChatBot,
            Script::FailFor(vec!["bad"]),
        ))
        .await;

    for recipient in ["ok-1", "ok-2", "bad"] {
        engine
            .service
            .queue_notification(chat(recipient, "hello"))
            .await
            .unwrap();
    }
    engine
        .service
        .queue_notification(QueuedNotification::new(
            NotificationChannel::Email,
            "later@example.com",
            "Later",
            "hello",
        ).scheduled_at(engine_now(&engine) + chrono::Duration::hours(1)))
        .await
        .unwrap();

    engine
        .service
        .process_queue(&CancellationToken::new(), 10)
        .await
        .unwrap();

    let stats = engine.service.get_queue_stats().await.unwrap();
    assert_eq!(stats.pending_count, 1);
    assert_eq!(stats.count(DeliveryStatus::Delivered), 2);
    assert_eq!(stats.count(DeliveryStatus::Failed), 1);
    assert_eq!(stats.count(DeliveryStatus::Processing), 0);
}
