use crate::domain::{errors::DomainError, ChatExchange, Embedding, MemoryMatch};
use async_trait::async_trait;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Past exchanges of `user_id` whose similarity to `query` is at least
    /// `threshold`, most similar first, at most `count` of them.
    async fn match_relevant(
        &self,
        query: &Embedding,
        user_id: &str,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<MemoryMatch>, DomainError>;

    async fn insert(&self, exchange: &ChatExchange) -> Result<(), DomainError>;

    /// Problems with the backing store's setup, one message each.
    async fn diagnose(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &'static str;
}
