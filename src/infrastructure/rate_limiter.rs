use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::entities::{
    default_rate_limit_rules, to_chrono, NotificationChannel, RateLimitEntry, RateLimitRule,
    RateLimitStats,
};
use crate::domain::errors::DeliveryResult;
use crate::domain::ports::{RateLimiter, TimeService};
use crate::infrastructure::runtime::TokioTimeService;

#[derive(Default)]
struct LimiterState {
    rules: HashMap<NotificationChannel, RateLimitRule>,
    entries: HashMap<(NotificationChannel, String), RateLimitEntry>,
}

/// Fixed-window rate limiter keyed by (recipient, channel).
///
/// Rules and counters share one lock so a check and its increment happen
/// in the same critical section.
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    state: Arc<RwLock<LimiterState>>,
    clock: Arc<dyn TimeService>,
}

impl InMemoryRateLimiter {
    /// Limiter preloaded with the default per-channel rules.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioTimeService::new()))
    }

    pub fn with_clock(clock: Arc<dyn TimeService>) -> Self {
        Self::with_rules(default_rate_limit_rules(), clock)
    }

    pub fn with_rules(rules: Vec<RateLimitRule>, clock: Arc<dyn TimeService>) -> Self {
        let state = LimiterState {
            rules: rules.into_iter().map(|r| (r.channel, r)).collect(),
            entries: HashMap::new(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            clock,
        }
    }

    fn entry_key(key: &str, channel: NotificationChannel) -> (NotificationChannel, String) {
        (channel, key.to_string())
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn allow(&self, key: &str, channel: NotificationChannel) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let Some(rule) = state.rules.get(&channel).cloned() else {
            return true;
        };

        let entry = state
            .entries
            .entry(Self::entry_key(key, channel))
            .or_insert_with(|| RateLimitEntry::new(now));
        if entry.is_window_expired(rule.window_size, now) {
            entry.reset_window(now);
        }
        if entry.count >= rule.max_requests {
            return false;
        }
        entry.count += 1;
        entry.last_request = now;
        true
    }

    async fn get_remaining_requests(&self, key: &str, channel: NotificationChannel) -> u32 {
        let now = self.clock.now();
        let state = self.state.read().await;
        let Some(rule) = state.rules.get(&channel) else {
            return u32::MAX;
        };
        match state.entries.get(&Self::entry_key(key, channel)) {
            Some(entry) if !entry.is_window_expired(rule.window_size, now) => {
                rule.max_requests.saturating_sub(entry.count)
            }
            _ => rule.max_requests,
        }
    }

    async fn get_reset_time(&self, key: &str, channel: NotificationChannel) -> DateTime<Utc> {
        let now = self.clock.now();
        let state = self.state.read().await;
        let Some(rule) = state.rules.get(&channel) else {
            return now;
        };
        match state.entries.get(&Self::entry_key(key, channel)) {
            Some(entry) => entry.window_end(rule.window_size),
            None => now + to_chrono(rule.window_size),
        }
    }

    async fn set_rule(&self, rule: RateLimitRule) -> DeliveryResult<()> {
        rule.validate()?;
        tracing::info!(
            "Rate limit for {} set to {} requests per {:?}",
            rule.channel,
            rule.max_requests,
            rule.window_size
        );
        self.state.write().await.rules.insert(rule.channel, rule);
        Ok(())
    }

    async fn get_rule(&self, channel: NotificationChannel) -> Option<RateLimitRule> {
        self.state.read().await.rules.get(&channel).cloned()
    }

    async fn remove_rule(&self, channel: NotificationChannel) -> bool {
        let mut state = self.state.write().await;
        state.entries.retain(|(c, _), _| *c != channel);
        state.rules.remove(&channel).is_some()
    }

    async fn reset(&self, key: &str, channel: NotificationChannel) {
        self.state
            .write()
            .await
            .entries
            .remove(&Self::entry_key(key, channel));
    }

    async fn get_stats(&self, channel: NotificationChannel) -> RateLimitStats {
        let state = self.state.read().await;
        RateLimitStats {
            channel,
            rule: state.rules.get(&channel).cloned(),
            active_entries: state.entries.keys().filter(|(c, _)| *c == channel).count(),
        }
    }

    async fn evict_stale(&self, idle_for: Duration) -> usize {
        let now = self.clock.now();
        let idle_cutoff = now - to_chrono(idle_for);
        let mut state = self.state.write().await;
        let LimiterState { rules, entries } = &mut *state;
        let before = entries.len();
        entries.retain(|(channel, _), entry| {
            let window_open = rules
                .get(channel)
                .map(|rule| !entry.is_window_expired(rule.window_size, now))
                .unwrap_or(false);
            window_open || entry.last_request >= idle_cutoff
        });
        before - entries.len()
    }
}
