use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::domain::{ports::RateLimiter, DomainError, RateDecision};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started_at: DateTime<Utc>,
}

/// Fixed-window request counter per client key.
///
/// Each key is updated under its map-shard lock, so concurrent requests from
/// the same client cannot both take the last slot.
pub struct InMemoryRateLimiter {
    limit: u64,
    window: TimeDelta,
    windows: DashMap<String, Window>,
}

impl InMemoryRateLimiter {
    pub fn new(limit: u64, window_secs: u64) -> Self {
        Self {
            limit,
            window: TimeDelta::seconds(window_secs as i64),
            windows: DashMap::new(),
        }
    }

    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateDecision {
        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started_at: now,
        });

        if now - window.started_at > self.window {
            window.count = 0;
            window.started_at = now;
        }

        if window.count >= self.limit {
            return RateDecision::Limited {
                reset_at: window.started_at + self.window,
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.limit - window.count,
        }
    }

    /// Forgets clients whose window has already expired.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now - window.started_at <= self.window);
        before - self.windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, DomainError> {
        Ok(self.check_at(key, Utc::now()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
