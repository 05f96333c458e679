use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use deadpool_redis::redis::{cmd, pipe, Pipeline};
use deadpool_redis::{Config, Connection, Pool, Runtime};

use crate::domain::{ports::RateLimiter, DomainError, RateDecision};

pub type RedisPool = Pool;

pub fn create_pool(redis_url: &str) -> Result<RedisPool, DomainError> {
    let cfg = Config::from_url(redis_url);
    cfg.create_pool(Some(Runtime::Tokio1))
        .map_err(|e| DomainError::external(format!("redis pool: {e}")))
}

fn key(client: &str) -> String {
    format!("ratelimit:{client}")
}

/// `MULTI INCR; EXPIRE NX; TTL EXEC`: the expiry is set in the same
/// transaction as the first increment, so no key outlives its window.
fn window_pipeline(key: &str, window_secs: u64) -> Pipeline {
    let mut pipeline = pipe();
    pipeline
        .atomic()
        .incr(key, 1u64)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .ttl(key);
    pipeline
}

/// `ttl` is the key's remaining lifetime as reported by Redis; negative
/// values (no expiry, no key) fall back to a full window.
fn decide(count: u64, ttl: i64, limit: u64, window_secs: u64, now: DateTime<Utc>) -> RateDecision {
    if count > limit {
        let remaining = if ttl > 0 { ttl } else { window_secs as i64 };
        RateDecision::Limited {
            reset_at: now + TimeDelta::seconds(remaining),
        }
    } else {
        RateDecision::Allowed {
            remaining: limit - count,
        }
    }
}

/// Fixed-window counter kept in Redis, shared by every server process.
///
/// The first request of a window creates the key with `INCR` and starts its
/// expiry in the same transaction; the key vanishing is the window reset.
#[derive(Clone)]
pub struct RedisRateLimiter {
    pool: RedisPool,
    limit: u64,
    window_secs: u64,
}

impl RedisRateLimiter {
    pub fn new(pool: RedisPool, limit: u64, window_secs: u64) -> Self {
        Self {
            pool,
            limit,
            window_secs,
        }
    }

    async fn conn(&self) -> Result<Connection, DomainError> {
        self.pool
            .get()
            .await
            .map_err(|e| DomainError::external(format!("redis pool: {e}")))
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, client: &str) -> Result<RateDecision, DomainError> {
        let mut conn = self.conn().await?;
        let key = key(client);

        let (count, ttl): (u64, i64) = window_pipeline(&key, self.window_secs)
            .query_async(&mut *conn)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(decide(count, ttl, self.limit, self.window_secs, Utc::now()))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        let mut conn = self.conn().await?;
        let pong: String = cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(DomainError::external(format!("unexpected PING reply {pong:?}")))
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_namespaced() {
        assert_eq!(key("abc"), "ratelimit:abc");
    }

    #[test]
    fn test_window_pipeline_sets_expiry_atomically() {
        let packed = window_pipeline("ratelimit:abc", 60).get_packed_pipeline();
        let packed = String::from_utf8_lossy(&packed);

        let order: Vec<usize> = ["MULTI", "INCR", "EXPIRE", "NX", "TTL", "EXEC"]
            .iter()
            .map(|word| packed.find(word).unwrap_or_else(|| panic!("{word} missing: {packed}")))
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{packed}");
    }

    #[test]
    fn test_decide_allows_up_to_limit() {
        let now = Utc::now();
        assert_eq!(decide(1, 60, 3, 60, now), RateDecision::Allowed { remaining: 2 });
        assert_eq!(decide(3, 10, 3, 60, now), RateDecision::Allowed { remaining: 0 });
    }

    #[test]
    fn test_decide_trips_with_reset_from_ttl() {
        let now = Utc::now();
        assert_eq!(
            decide(4, 25, 3, 60, now),
            RateDecision::Limited {
                reset_at: now + TimeDelta::seconds(25)
            }
        );
    }

    #[test]
    fn test_decide_without_ttl_uses_full_window() {
        let now = Utc::now();
        for ttl in [-1, -2, 0] {
            assert_eq!(
                decide(9, ttl, 3, 60, now),
                RateDecision::Limited {
                    reset_at: now + TimeDelta::seconds(60)
                }
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_an_external_error() {
        let pool = create_pool("redis://127.0.0.1:1").unwrap();
        let limiter = RedisRateLimiter::new(pool, 10, 60);

        let err = limiter.check("client").await.unwrap_err();

        assert!(matches!(err, DomainError::ExternalService(_)));
    }
}
