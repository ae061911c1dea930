use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{build_http_client, status_error, transport_error};
use crate::domain::entities::NotificationChannel;
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::DeliveryChannel;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Team-chat channel posting to an incoming-webhook URL (Slack and
/// Discord compatible). The recipient names the target room.
pub struct TeamChatChannel {
    webhook_url: String,
    client: Client,
}

impl TeamChatChannel {
    pub fn new(webhook_url: impl Into<String>) -> DeliveryResult<Self> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            client: build_http_client(REQUEST_TIMEOUT)?,
        })
    }
}

pub(crate) fn build_payload(recipient: &str, subject: &str, message: &str) -> serde_json::Value {
    let text = if subject.trim().is_empty() {
        message.to_string()
    } else {
        format!("*{}*\n{}", subject, message)
    };
    // `content` is what Discord reads; Slack reads `text` and `channel`.
    json!({
        "channel": recipient,
        "text": text,
        "content": text,
    })
}

#[async_trait]
impl DeliveryChannel for TeamChatChannel {
    async fn send(&self, recipient: &str, subject: &str, message: &str) -> DeliveryResult<String> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&build_payload(recipient, subject, message))
            .send()
            .await
            .map_err(|e| transport_error(e, REQUEST_TIMEOUT))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(DeliveryError::DeliveryFailed(format!(
                "team chat rate limit hit, retry after {}",
                retry_after
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let id = Uuid::new_v4().to_string();
        debug!("Team chat message {} posted to {}", id, recipient);
        Ok(id)
    }

    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::TeamChat
    }

    async fn is_available(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn rate_limit_info(&self) -> (u32, Duration) {
        (50, Duration::from_secs(60))
    }
}
