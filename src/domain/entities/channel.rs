use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DeliveryError;

/// Outbound delivery medium a notification is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    ChatBot,
    Email,
    TeamChat,
    Webhook,
}

impl NotificationChannel {
    pub const ALL: [NotificationChannel; 4] = [
        NotificationChannel::ChatBot,
        NotificationChannel::Email,
        NotificationChannel::TeamChat,
        NotificationChannel::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::ChatBot => "chat_bot",
            NotificationChannel::Email => "email",
            NotificationChannel::TeamChat => "team_chat",
            NotificationChannel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = DeliveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" => Err(DeliveryError::InvalidArgument(
                "channel type cannot be empty".to_string(),
            )),
            "chat_bot" | "chatbot" | "telegram" => Ok(NotificationChannel::ChatBot),
            "email" => Ok(NotificationChannel::Email),
            "team_chat" | "teamchat" | "slack" | "discord" => Ok(NotificationChannel::TeamChat),
            "webhook" => Ok(NotificationChannel::Webhook),
            other => Err(DeliveryError::InvalidArgument(format!(
                "unknown channel type: {}",
                other
            ))),
        }
    }
}
