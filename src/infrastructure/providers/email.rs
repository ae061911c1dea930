use async_trait::async_trait;
use email_address::EmailAddress;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::NotificationChannel;
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::DeliveryChannel;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    /// Implicit TLS (465); otherwise STARTTLS is required.
    pub use_tls: bool,
}

/// Email channel over SMTP. Recipients are plain addresses.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl EmailChannel {
    pub fn new(config: SmtpConfig) -> DeliveryResult<Self> {
        let from: Mailbox = config.from_address.parse().map_err(|e| {
            DeliveryError::InvalidArgument(format!(
                "invalid from address {}: {}",
                config.from_address, e
            ))
        })?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| DeliveryError::InvalidArgument(format!("invalid SMTP host: {}", e)))?;

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));
        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            host: config.host,
        })
    }

    fn build_message(&self, recipient: &str, subject: &str, body: &str) -> DeliveryResult<(Message, String)> {
        if !EmailAddress::is_valid(recipient) {
            return Err(DeliveryError::DeliveryFailed(format!(
                "invalid recipient address: {}",
                recipient
            )));
        }
        let to: Mailbox = recipient.parse().map_err(|e| {
            DeliveryError::DeliveryFailed(format!("invalid recipient address {}: {}", recipient, e))
        })?;

        let domain = self.from.email.domain().to_string();
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::DeliveryFailed(format!("failed to build email: {}", e)))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    async fn send(&self, recipient: &str, subject: &str, message: &str) -> DeliveryResult<String> {
        let (email, message_id) = self.build_message(recipient, subject, message)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::DeliveryFailed(format!("SMTP send failed: {}", e)))?;

        debug!("Email {} sent to {} via {}", message_id, recipient, self.host);
        Ok(message_id)
    }

    fn channel_type(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn is_available(&self) -> bool {
        !self.host.is_empty()
    }

    fn max_retries(&self) -> u32 {
        5
    }

    fn rate_limit_info(&self) -> (u32, Duration) {
        (10, Duration::from_secs(60))
    }
}
