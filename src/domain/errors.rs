use thiserror::Error;

use crate::domain::entities::NotificationChannel;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("No delivery channel registered for {0}")]
    ChannelNotRegistered(NotificationChannel),
    #[error("Delivery channel {0} is not available")]
    ChannelUnavailable(NotificationChannel),
    #[error("Rate limit exceeded for {recipient} on {channel}")]
    RateLimited {
        channel: NotificationChannel,
        recipient: String,
    },
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Stable machine-readable code, used in logs and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::InvalidArgument(_) => "invalid_argument",
            DeliveryError::NotFound(_) => "not_found",
            DeliveryError::AlreadyExists(_) => "already_exists",
            DeliveryError::Conflict(_) => "conflict",
            DeliveryError::ChannelNotRegistered(_) => "channel_not_registered",
            DeliveryError::ChannelUnavailable(_) => "channel_unavailable",
            DeliveryError::RateLimited { .. } => "rate_limited",
            DeliveryError::DeliveryFailed(_) => "delivery_failed",
            DeliveryError::Cancelled => "cancelled",
            DeliveryError::Storage(_) => "storage",
            DeliveryError::Internal(_) => "internal",
        }
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;
