//! Chat-bot channel backed by the Telegram Bot API (`POST /bot<token>/sendMessage`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::{build_http_client, status_error, transport_error, truncate_chars};
use crate::domain::entities::NotificationChannel;
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::DeliveryChannel;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    result: Option<SentMessage>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Sends to a chat id given as the recipient.
pub struct TelegramChannel {
    bot_token: String,
    api_base: String,
    client: Client,
}

impl TelegramChannel {
    pub fn new(bot_token: impl Into<String>) -> DeliveryResult<Self> {
        Self::with_api_base(bot_token, TELEGRAM_API_BASE)
    }

    /// Points the adapter at another Bot API server (self-hosted or test double).
    pub fn with_api_base(
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> DeliveryResult<Self> {
        Ok(Self {
            bot_token: bot_token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: build_http_client(REQUEST_TIMEOUT)?,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

/// Bold subject line followed by the body, escaped for HTML parse mode.
///
/// Telegram counts the limit on the text after entity parsing, so the cut is
/// made on the raw text and never lands inside an entity or the bold tag.
pub(crate) fn format_text(subject: &str, message: &str) -> String {
    if subject.trim().is_empty() {
        return escape_html(&truncate_chars(message, TELEGRAM_MESSAGE_LIMIT));
    }
    let subject = truncate_chars(subject, TELEGRAM_MESSAGE_LIMIT);
    let budget = TELEGRAM_MESSAGE_LIMIT.saturating_sub(subject.chars().count() + 2);
    format!(
        "<b>{}</b>\n\n{}",
        escape_html(&subject),
        escape_html(&truncate_chars(message, budget))
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, recipient: &str, subject: &str, message: &str) -> DeliveryResult<String> {
        let payload = json!({
            "chat_id": recipient,
            "text": format_text(subject, message),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.send_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(e, REQUEST_TIMEOUT))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<SendMessageResponse> = serde_json::from_str(&body).ok();

        if status.as_u16() == 429 {
            let retry_after = parsed
                .as_ref()
                .and_then(|r| r.parameters.as_ref())
                .and_then(|p| p.retry_after)
                .unwrap_or(1);
            warn!("Telegram rate limited chat {}, retry after {}s", recipient, retry_after);
            return Err(DeliveryError::DeliveryFailed(format!(
                "Telegram rate limit hit, retry after {} seconds",
                retry_after
            )));
        }

        match parsed {
            Some(SendMessageResponse {
                ok: true,
                result: Some(sent),
                ..
            }) if status.is_success() => {
                debug!("Telegram message {} sent to chat {}", sent.message_id, recipient);
                Ok(sent.message_id.to_string())
            }
            Some(SendMessageResponse {
                description: Some(description),
                ..
            }) => Err(DeliveryError::DeliveryFailed(format!(
                "Telegram sendMessage failed ({}): {}",
                status.as_u16(),
                description
            ))),
            _ => Err(status_error(status, &body)),
        }
    }

    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::ChatBot
    }

    async fn is_available(&self) -> bool {
        !self.bot_token.is_empty()
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn rate_limit_info(&self) -> (u32, Duration) {
        (30, Duration::from_secs(60))
    }
}
