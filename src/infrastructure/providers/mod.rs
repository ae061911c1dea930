//! Delivery channel adapters, one per transport.

pub mod email;
pub mod team_chat;
pub mod telegram;
pub mod webhook;
pub mod webhook_signature;

pub use email::{EmailChannel, SmtpConfig};
pub use team_chat::TeamChatChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::domain::errors::{DeliveryError, DeliveryResult};

/// Longest response body excerpt kept in an error message.
const ERROR_BODY_LIMIT: usize = 500;

pub(crate) fn build_http_client(timeout: Duration) -> DeliveryResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DeliveryError::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Maps a transport-level reqwest failure to a delivery error.
pub(crate) fn transport_error(e: reqwest::Error, timeout: Duration) -> DeliveryError {
    let message = if e.is_timeout() {
        format!("Connection timeout after {} seconds: {}", timeout.as_secs(), e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        format!("Network error: {}", e)
    };
    DeliveryError::DeliveryFailed(message)
}

/// Maps a non-success HTTP response to a delivery error carrying a body excerpt.
pub(crate) fn status_error(status: StatusCode, body: &str) -> DeliveryError {
    let reason = status.canonical_reason().unwrap_or("");
    if body.is_empty() {
        return DeliveryError::DeliveryFailed(format!("HTTP {} {}", status.as_u16(), reason));
    }
    DeliveryError::DeliveryFailed(format!(
        "HTTP {} {}: {}",
        status.as_u16(),
        reason,
        truncate_chars(body, ERROR_BODY_LIMIT)
    ))
}

pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_status_error_mentions_reason() {
        let err = status_error(StatusCode::FORBIDDEN, "");
        assert_eq!(err.to_string(), "Delivery failed: HTTP 403 Forbidden");

        let long = "x".repeat(ERROR_BODY_LIMIT + 50);
        let err = status_error(StatusCode::BAD_GATEWAY, &long);
        assert!(err.to_string().len() < long.len());
    }
}
