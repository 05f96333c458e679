//! Chat memory kept in a Supabase (PostgREST) project.
//!
//! Similarity search is the `match_relevant_chats` SQL function exposed over
//! RPC; rows are written to the `chats` table.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{ports::MemoryStore, ChatExchange, DomainError, Embedding, MemoryMatch};

pub const MATCH_FUNCTION: &str = "match_relevant_chats";
pub const CHATS_TABLE: &str = "chats";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SupabaseMemoryStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    dimension: usize,
}

impl SupabaseMemoryStore {
    /// `dimension` is the embedding size used by the startup diagnostics.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, DomainError> {
        Self::with_timeout(base_url, api_key, dimension, REQUEST_TIMEOUT)
    }

    /// Every request fails with an external error once `timeout` elapses.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dimension,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DomainError> {
        let response = request
            .send()
            .await
            .map_err(|e| DomainError::external(format!("supabase request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("supabase returned {status}: {body}");
        if status == StatusCode::NOT_FOUND {
            Err(DomainError::not_found(message))
        } else {
            Err(DomainError::external(message))
        }
    }

    async fn rpc_match(
        &self,
        query: &Embedding,
        user_id: &str,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<MemoryMatch>, DomainError> {
        let body = json!({
            "query_embedding": query.as_slice(),
            "match_threshold": threshold,
            "match_count": count,
            "request_user_id": user_id,
        });

        let response = self
            .send(
                self.request(Method::POST, &format!("rpc/{MATCH_FUNCTION}"))
                    .json(&body),
            )
            .await?;

        response
            .json()
            .await
            .map_err(|e| DomainError::external(format!("unexpected {MATCH_FUNCTION} result: {e}")))
    }

    async fn check_match_function(&self) -> Option<String> {
        let nil_user = Uuid::nil().to_string();
        match self
            .rpc_match(&Embedding::zeros(self.dimension), &nil_user, 0.0, 1)
            .await
        {
            Ok(_) => None,
            Err(DomainError::NotFound(_)) => Some(format!(
                "function '{MATCH_FUNCTION}' does not exist or is not accessible"
            )),
            Err(e) => Some(format!("function '{MATCH_FUNCTION}' check failed: {e}")),
        }
    }

    async fn check_embedding_column(&self) -> Option<String> {
        let test_row_id = Uuid::new_v4();
        let row = json!({
            "id": test_row_id,
            "user_id": Uuid::nil(),
            "message": "test",
            "response": "test",
            "embedding": Embedding::zeros(self.dimension),
        });

        let upsert = self
            .request(Method::POST, CHATS_TABLE)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row);
        let result = match self.send(upsert).await {
            Ok(_) => {
                let delete = self
                    .request(Method::DELETE, CHATS_TABLE)
                    .query(&[("id", format!("eq.{test_row_id}"))]);
                self.send(delete).await.map(|_| ())
            }
            Err(e) => Err(e),
        };

        result.err().map(|e| {
            format!("table '{CHATS_TABLE}' is missing the 'embedding' column or is misconfigured: {e}")
        })
    }
}

#[async_trait]
impl MemoryStore for SupabaseMemoryStore {
    #[instrument(skip(self, query), fields(dimension = query.dimension()))]
    async fn match_relevant(
        &self,
        query: &Embedding,
        user_id: &str,
        threshold: f32,
        count: usize,
    ) -> Result<Vec<MemoryMatch>, DomainError> {
        self.rpc_match(query, user_id, threshold, count).await
    }

    #[instrument(skip(self, exchange), fields(user_id = %exchange.user_id))]
    async fn insert(&self, exchange: &ChatExchange) -> Result<(), DomainError> {
        let row = json!({
            "user_id": exchange.user_id,
            "message": exchange.message,
            "response": exchange.response,
            "embedding": exchange.embedding,
        });

        self.send(
            self.request(Method::POST, CHATS_TABLE)
                .header("Prefer", "return=minimal")
                .header(header::CONTENT_TYPE, "application/json")
                .json(&row),
        )
        .await
        .map(|_| ())
    }

    async fn diagnose(&self) -> Vec<String> {
        let mut issues = Vec::new();
        issues.extend(self.check_match_function().await);
        issues.extend(self.check_embedding_column().await);
        issues
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
