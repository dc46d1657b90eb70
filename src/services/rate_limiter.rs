//! Sliding-window rate limiters
//!
//! Used for login attempts (5 failures per username per 15 minutes) and
//! comment posting (a configurable number per user per minute). State lives
//! in memory; `cleanup` is called periodically from `main`.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counts events per key within a sliding window
pub struct RateLimiter {
    max_events: usize,
    window: Duration,
    events: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl RateLimiter {
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            events: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Failed logins: 5 per 15 minutes
    pub fn for_logins() -> Self {
        Self::new(5, Duration::minutes(15))
    }

    /// Comment posting: `per_minute` per user
    pub fn for_comments(per_minute: usize) -> Self {
        Self::new(per_minute.max(1), Duration::minutes(1))
    }

    fn normalize(key: &str) -> String {
        key.to_lowercase()
    }

    /// Whether the key has used up its window
    pub async fn is_limited(&self, key: &str) -> bool {
        let mut events = self.events.write().await;
        let cutoff = Utc::now() - self.window;

        let times = events.entry(Self::normalize(key)).or_default();
        times.retain(|t| *t > cutoff);
        times.len() >= self.max_events
    }

    pub async fn record(&self, key: &str) {
        let mut events = self.events.write().await;
        events.entry(Self::normalize(key)).or_default().push(Utc::now());
    }

    /// Record an event unless the key is limited. Returns false when limited.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let mut events = self.events.write().await;
        let now = Utc::now();
        let cutoff = now - self.window;

        let times = events.entry(Self::normalize(key)).or_default();
        times.retain(|t| *t > cutoff);
        if times.len() >= self.max_events {
            return false;
        }
        times.push(now);
        true
    }

    /// Forget a key, e.g. after a successful login
    pub async fn clear(&self, key: &str) {
        self.events.write().await.remove(&Self::normalize(key));
    }

    /// Drop expired events and empty keys
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        events.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.events.read().await.len()
    }
}
