use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::{ports::MemoryStore, ChatExchange, DomainError, Embedding, MemoryMatch};

/// Process-local chat memory with brute-force cosine matching.
pub struct InMemoryMemoryStore {
    exchanges: RwLock<Vec<ChatExchange>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            exchanges: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.exchanges.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of everything stored for `user_id`, oldest first.
    pub fn exchanges_for(&self, user_id: &str) -> Vec<ChatExchange> {
        self.exchanges
            .read()
            .map(|store| {
                store
                    .iter()
                    .filter(|e| e.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn match_relevant(
        &self,
        query: &Embedding,
        user_id: &str,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<MemoryMatch>, DomainError> {
        let store = self
            .exchanges
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let mut results: Vec<MemoryMatch> = store
            .iter()
            .filter(|exchange| exchange.user_id == user_id)
            .map(|exchange| {
                MemoryMatch::new(
                    exchange.message.clone(),
                    exchange.response.clone(),
                    query.cosine_similarity(&exchange.embedding),
                )
            })
            .filter(|m| m.similarity >= threshold)
            .collect();

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(count);
        Ok(results)
    }

    async fn insert(&self, exchange: &ChatExchange) -> Result<(), DomainError> {
        let mut store = self
            .exchanges
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.retain(|e| e.id != exchange.id);
        store.push(exchange.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
