use std::sync::Arc;

use crate::application::services::{NotificationDeliveryService, RetryService};
use crate::config::Config;
use crate::domain::entities::RateLimitRule;
use crate::domain::errors::DeliveryResult;
use crate::domain::ports::{
    DeadLetterSink, DeliveryChannel, DeliveryQueueRepository, RateLimiter,
    RetryConfigurationRepository, TimeService,
};
use crate::infrastructure::persistence::{
    Database, InMemoryDeadLetterSink, InMemoryDeliveryQueueRepository,
    InMemoryRetryConfigurationRepository, SqliteDeliveryQueueRepository,
};
use crate::infrastructure::providers::{
    EmailChannel, TeamChatChannel, TelegramChannel, WebhookChannel,
};
use crate::infrastructure::rate_limiter::InMemoryRateLimiter;
use crate::infrastructure::runtime::TokioTimeService;

/// Wires the delivery service from configuration: queue store, limiter,
/// retry policies, dead-letter sink and every channel adapter that has credentials.
pub async fn build_engine(config: &Config) -> DeliveryResult<Arc<NotificationDeliveryService>> {
    let clock: Arc<dyn TimeService> = Arc::new(TokioTimeService::new());

    let queue: Arc<dyn DeliveryQueueRepository> = match config.database_url.as_deref() {
        Some(url) if url.starts_with("sqlite") => {
            let db = Database::connect(url).await?;
            db.run_migrations().await?;
            tracing::info!("Delivery queue backed by SQLite");
            Arc::new(SqliteDeliveryQueueRepository::with_clock(db, clock.clone()))
        }
        Some(url) => {
            tracing::warn!(
                "Unsupported DATABASE_URL scheme in {:?}, falling back to the in-memory queue",
                url
            );
            Arc::new(InMemoryDeliveryQueueRepository::with_clock(clock.clone()))
        }
        None => {
            tracing::info!("Delivery queue kept in memory");
            Arc::new(InMemoryDeliveryQueueRepository::with_clock(clock.clone()))
        }
    };

    let rate_limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::with_clock(clock.clone()));

    let retry_repo: Arc<dyn RetryConfigurationRepository> =
        Arc::new(InMemoryRetryConfigurationRepository::new());
    let retry_service = Arc::new(RetryService::new(retry_repo, clock.clone()));
    let created = retry_service.initialize_default_retry_configurations().await?;
    tracing::info!("Retry configurations initialized ({} created)", created);

    let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(InMemoryDeadLetterSink::new());

    let service = NotificationDeliveryService::new(
        queue,
        rate_limiter,
        retry_service,
        dead_letters,
        clock,
    )
    .with_send_timeout(config.send_timeout);

    for adapter in configured_channels(config)? {
        register_with_rule(&service, adapter).await?;
    }

    Ok(Arc::new(service))
}

fn configured_channels(config: &Config) -> DeliveryResult<Vec<Arc<dyn DeliveryChannel>>> {
    let mut adapters: Vec<Arc<dyn DeliveryChannel>> = Vec::new();

    if let Some(token) = &config.telegram_bot_token {
        adapters.push(Arc::new(TelegramChannel::new(token.clone())?));
    } else {
        tracing::info!("TELEGRAM_BOT_TOKEN not set, chat bot channel disabled");
    }

    if let Some(smtp) = &config.smtp {
        adapters.push(Arc::new(EmailChannel::new(smtp.clone())?));
    } else {
        tracing::info!("SMTP_HOST not set, email channel disabled");
    }

    if let Some(url) = &config.team_chat_webhook_url {
        adapters.push(Arc::new(TeamChatChannel::new(url.clone())?));
    } else {
        tracing::info!("TEAM_CHAT_WEBHOOK_URL not set, team chat channel disabled");
    }

    // Webhook targets come from the recipient, so this channel is always on.
    adapters.push(Arc::new(WebhookChannel::new(
        config.webhook_signing_secret.clone(),
    )?));

    Ok(adapters)
}

/// Registers an adapter and, if its channel has no rate rule yet, installs
/// one from the adapter's advertised limits.
pub async fn register_with_rule(
    service: &NotificationDeliveryService,
    adapter: Arc<dyn DeliveryChannel>,
) -> DeliveryResult<()> {
    let channel = adapter.channel_type();
    let limiter = service.rate_limiter();
    if limiter.get_rule(channel).await.is_none() {
        let (max_requests, window) = adapter.rate_limit_info();
        limiter
            .set_rule(RateLimitRule::new(channel, max_requests, window))
            .await?;
        tracing::debug!(
            "Seeded rate limit for {}: {} per {:?}",
            channel,
            max_requests,
            window
        );
    }
    service.register_delivery_channel(adapter).await;
    Ok(())
}
