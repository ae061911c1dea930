use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entities::{NotificationChannel, RetryConfiguration};
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::ports::RetryConfigurationRepository;

#[derive(Clone, Default)]
pub struct InMemoryRetryConfigurationRepository {
    configs: Arc<RwLock<HashMap<String, RetryConfiguration>>>,
}

impl InMemoryRetryConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetryConfigurationRepository for InMemoryRetryConfigurationRepository {
    async fn create(&self, config: &RetryConfiguration) -> DeliveryResult<()> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.id) {
            return Err(DeliveryError::AlreadyExists(format!(
                "retry configuration {}",
                config.id
            )));
        }
        if configs.values().any(|c| c.channel == config.channel) {
            return Err(DeliveryError::AlreadyExists(format!(
                "retry configuration for {}",
                config
                    .channel
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "default".to_string())
            )));
        }
        configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> DeliveryResult<Option<RetryConfiguration>> {
        Ok(self.configs.read().await.get(id).cloned())
    }

    async fn get_by_channel(
        &self,
        channel: Option<NotificationChannel>,
    ) -> DeliveryResult<Option<RetryConfiguration>> {
        let configs = self.configs.read().await;
        Ok(configs.values().find(|c| c.channel == channel).cloned())
    }

    async fn update(&self, config: &RetryConfiguration) -> DeliveryResult<()> {
        let mut configs = self.configs.write().await;
        match configs.get_mut(&config.id) {
            Some(slot) => {
                *slot = config.clone();
                Ok(())
            }
            None => Err(DeliveryError::NotFound(format!(
                "retry configuration {}",
                config.id
            ))),
        }
    }

    async fn delete(&self, id: &str) -> DeliveryResult<()> {
        self.configs
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DeliveryError::NotFound(format!("retry configuration {}", id)))
    }

    async fn list_active(&self) -> DeliveryResult<Vec<RetryConfiguration>> {
        let configs = self.configs.read().await;
        let mut active: Vec<RetryConfiguration> =
            configs.values().filter(|c| c.is_active).cloned().collect();
        active.sort_by(|a, b| a.channel.cmp(&b.channel));
        Ok(active)
    }
}
