use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{
    ports::{EmbeddingService, MemoryStore},
    ChatExchange, DomainError, Embedding, MemoryMatch,
};

/// Long-term chat memory: embeds prompts, recalls similar past exchanges and
/// stores new ones.
pub struct MemoryService {
    embedding: Arc<dyn EmbeddingService>,
    store: Arc<dyn MemoryStore>,
    match_threshold: f32,
    match_count: usize,
}

impl MemoryService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        store: Arc<dyn MemoryStore>,
        match_threshold: f32,
        match_count: usize,
    ) -> Self {
        Self {
            embedding,
            store,
            match_threshold,
            match_count,
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    #[instrument(skip_all)]
    pub async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embedding.embed(text).await
    }

    #[instrument(skip(self, query))]
    pub async fn recall(
        &self,
        query: &Embedding,
        user_id: &str,
    ) -> Result<Vec<MemoryMatch>, DomainError> {
        let matches = self
            .store
            .match_relevant(query, user_id, self.match_threshold, self.match_count)
            .await?;
        if !matches.is_empty() {
            info!(count = matches.len(), "found relevant memories");
        }
        Ok(matches)
    }

    #[instrument(skip(self, exchange), fields(user_id = %exchange.user_id))]
    pub async fn remember(&self, exchange: &ChatExchange) -> Result<(), DomainError> {
        self.store.insert(exchange).await
    }

    pub async fn diagnose(&self) -> Vec<String> {
        self.store.diagnose().await
    }
}
