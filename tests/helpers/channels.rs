use async_trait::async_trait;
use notifier::domain::entities::NotificationChannel;
use notifier::domain::errors::{DeliveryError, DeliveryResult};
use notifier::domain::ports::DeliveryChannel;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub enum Script {
    Succeed(&'static str),
    Fail(&'static str),
    /// Fails for recipients in the list, succeeds for everyone else.
    FailFor(Vec<&'static str>),
    /// Never completes.
    Hang,
    /// Cancels the token on the first send, then never completes.
    CancelOnSend(CancellationToken),
}

/// Adapter whose behaviour is fixed up front. Records every recipient it sees.
pub struct ScriptedChannel {
    channel: NotificationChannel,
    script: Script,
    available: AtomicBool,
    calls: AtomicUsize,
    recipients: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    pub fn new(channel: NotificationChannel, script: Script) -> Arc<Self> {
        Arc::new(Self {
            channel,
            script,
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            recipients: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding(channel: NotificationChannel) -> Arc<Self> {
        Self::new(channel, Script::Succeed("id-1"))
    }

    pub fn failing(channel: NotificationChannel) -> Arc<Self> {
        Self::new(channel, Script::Fail("connection refused"))
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recipients(&self) -> Vec<String> {
        self.recipients.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    async fn send(&self, recipient: &str, _subject: &str, _message: &str) -> DeliveryResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recipients.lock().unwrap().push(recipient.to_string());

        match &self.script {
            Script::Succeed(id) => Ok(id.to_string()),
            Script::Fail(reason) => Err(DeliveryError::DeliveryFailed(reason.to_string())),
            Script::FailFor(bad) if bad.iter().any(|b| *b == recipient) => {
                Err(DeliveryError::Internal("adapter crashed".to_string()))
            }
            Script::FailFor(_) => Ok(format!("msg-{}", recipient)),
            Script::Hang => std::future::pending().await,
            Script::CancelOnSend(token) => {
                token.cancel();
                std::future::pending().await
            }
        }
    }

    fn channel_type(&self) -> NotificationChannel {
        self.channel
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn max_retries(&self) -> u32 {
        3
    }

    fn rate_limit_info(&self) -> (u32, Duration) {
        (10, Duration::from_secs(60))
    }
}
