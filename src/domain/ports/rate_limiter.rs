use crate::domain::{errors::DomainError, RateDecision};
use async_trait::async_trait;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request for `key` and decides whether it may proceed.
    async fn check(&self, key: &str) -> Result<RateDecision, DomainError>;

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}
