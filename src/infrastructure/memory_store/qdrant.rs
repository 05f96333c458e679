use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, SearchPoints,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::domain::{ports::MemoryStore, ChatExchange, DomainError, Embedding, MemoryMatch};

pub struct QdrantMemoryStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantMemoryStore {
    pub async fn new(url: &str, collection: &str, dimension: usize) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| DomainError::external(e.to_string()))?;

        let store = Self {
            client,
            collection: collection.to_string(),
            dimension,
        };

        store.ensure_collection().await?;

        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<(), DomainError> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| DomainError::external(e.to_string()))?;
        }

        Ok(())
    }

    fn uuid_to_point_id(id: Uuid) -> u64 {
        let bytes = id.as_bytes();
        u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ])
    }
}

/// Nearest exchanges of one user scoring at least `threshold`.
fn search_request(
    collection: &str,
    query: &Embedding,
    user_id: &str,
    threshold: f32,
    count: usize,
) -> SearchPoints {
    SearchPointsBuilder::new(collection, query.as_slice().to_vec(), count as u64)
        .filter(user_filter(user_id))
        .score_threshold(threshold)
        .with_payload(true)
        .build()
}

fn user_filter(user_id: &str) -> Filter {
    Filter::must([Condition::matches("user_id", user_id.to_string())])
}

fn exchange_payload(exchange: &ChatExchange) -> Result<Payload, DomainError> {
    serde_json::json!({
        "exchange_id": exchange.id.to_string(),
        "user_id": exchange.user_id,
        "message": exchange.message,
        "response": exchange.response,
        "created_at": exchange.created_at.to_rfc3339(),
    })
    .try_into()
    .map_err(|_| DomainError::internal("Failed to create payload"))
}

fn match_from_payload(payload: &HashMap<String, Value>, score: f32) -> Option<MemoryMatch> {
    let message = payload.get("message")?.as_str()?.to_string();
    let response = payload.get("response")?.as_str()?.to_string();
    Some(MemoryMatch::new(message, response, score))
}

#[async_trait]
impl MemoryStore for QdrantMemoryStore {
    async fn match_relevant(
        &self,
        query: &Embedding,
        user_id: &str,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<MemoryMatch>, DomainError> {
        let results = self
            .client
            .search_points(search_request(
                &self.collection,
                query,
                user_id,
                threshold,
                count,
            ))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(results
            .result
            .iter()
            .filter_map(|point| match_from_payload(&point.payload, point.score))
            .collect())
    }

    async fn insert(&self, exchange: &ChatExchange) -> Result<(), DomainError> {
        let payload = exchange_payload(exchange)?;

        let point = PointStruct::new(
            Self::uuid_to_point_id(exchange.id),
            exchange.embedding.as_slice().to_vec(),
            payload,
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(())
    }

    async fn diagnose(&self) -> Vec<String> {
        match self.client.list_collections().await {
            Ok(list) if list.collections.iter().any(|c| c.name == self.collection) => Vec::new(),
            Ok(_) => vec![format!("collection '{}' does not exist", self.collection)],
            Err(e) => vec![format!("qdrant check failed: {e}")],
        }
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}
