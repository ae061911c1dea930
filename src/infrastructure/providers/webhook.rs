use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::webhook_signature::sign_payload;
use super::{build_http_client, status_error, transport_error};
use crate::domain::entities::NotificationChannel;
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::DeliveryChannel;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    delivery_id: &'a str,
    subject: &'a str,
    message: &'a str,
    sent_at: String,
}

/// Generic webhook channel: the recipient is the target URL.
///
/// Each request carries a JSON body, an `X-Delivery-Id` header and, when a
/// signing secret is configured, an `X-Webhook-Signature` HMAC-SHA256 header.
pub struct WebhookChannel {
    signing_secret: Option<String>,
    client: Client,
}

impl WebhookChannel {
    pub fn new(signing_secret: Option<String>) -> DeliveryResult<Self> {
        Ok(Self {
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
            client: build_http_client(REQUEST_TIMEOUT)?,
        })
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    async fn send(&self, recipient: &str, subject: &str, message: &str) -> DeliveryResult<String> {
        if !(recipient.starts_with("http://") || recipient.starts_with("https://")) {
            return Err(DeliveryError::DeliveryFailed(format!(
                "invalid recipient URL: {}",
                recipient
            )));
        }

        let delivery_id = Uuid::new_v4().to_string();
        let body = serde_json::to_string(&WebhookPayload {
            delivery_id: &delivery_id,
            subject,
            message,
            sent_at: Utc::now().to_rfc3339(),
        })
        .map_err(|e| DeliveryError::Internal(format!("failed to encode webhook payload: {}", e)))?;

        let mut request = self
            .client
            .post(recipient)
            .header("Content-Type", "application/json")
            .header("X-Delivery-Id", &delivery_id);
        if let Some(secret) = &self.signing_secret {
            request = request.header("X-Webhook-Signature", sign_payload(&body, secret));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let err = transport_error(e, REQUEST_TIMEOUT);
                warn!("Webhook delivery to {} failed: {}", recipient, err);
                err
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        info!(
            "Webhook delivery {} to {} returned status {}",
            delivery_id,
            recipient,
            status.as_u16()
        );
        Ok(delivery_id)
    }

    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::Webhook
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn rate_limit_info(&self) -> (u32, Duration) {
        (100, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_recipient() {
        let channel = WebhookChannel::new(None).unwrap();
        let err = channel
            .send("ftp://example.com/hook", "Build", "done")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid recipient"));
    }

    #[test]
    fn test_empty_secret_disables_signing() {
        let channel = WebhookChannel::new(Some(String::new())).unwrap();
        assert!(channel.signing_secret.is_none());
    }
}
