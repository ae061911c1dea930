use crate::domain::entities::to_chrono;
use crate::domain::ports::time_service::TimeService;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock that only moves when told to. `sleep` advances it instead of waiting.
#[derive(Clone)]
pub struct ManualTimeService {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualTimeService {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += to_chrono(by);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualTimeService {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait]
impl TimeService for ManualTimeService {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sleep_advances_without_waiting() {
        let start = Utc::now();
        let clock = ManualTimeService::new(start);
        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.now(), start + chrono::Duration::hours(1));
    }
}
