#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use void_z1::api::AppState;
use void_z1::application::ChatService;
use void_z1::domain::ports::{EmbeddingService, TextGenerator};
use void_z1::domain::{DomainError, Embedding, GenerationParams, Vocabulary};
use void_z1::infrastructure::{AppConfig, InMemoryRateLimiter};

/// Echoes the last characters of its prompt, one per requested token.
pub struct EchoGenerator {
    vocab: Vocabulary,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            vocab: Vocabulary::from_chars((' '..='~').chain(['\n'])),
        }
    }
}

impl TextGenerator for EchoGenerator {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        _deadline: Instant,
    ) -> Result<String, DomainError> {
        Ok(prompt.chars().rev().take(params.max_new_tokens).collect())
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}

pub struct FixedEmbedding;

#[async_trait]
impl EmbeddingService for FixedEmbedding {
    async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
        Ok(Embedding::new(vec![0.0, 1.0]))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        Ok(texts.iter().map(|_| Embedding::new(vec![0.0, 1.0])).collect())
    }

    fn dimension(&self) -> usize {
        2
    }
}

/// Config whose frontend directory holds a minimal built app.
pub fn test_config(frontend: &Path) -> AppConfig {
    std::fs::write(frontend.join("index.html"), "<html>void</html>").unwrap();
    std::fs::write(frontend.join("app.js"), "console.log('void')").unwrap();

    let mut config = AppConfig::default();
    config.server.frontend_dir = frontend.to_path_buf();
    config.model.max_prompt_length = 50;
    config
}

pub fn state_with(
    generator: Option<Arc<dyn TextGenerator>>,
    config: AppConfig,
    limit: u64,
) -> AppState {
    let chat = ChatService::new(
        generator,
        config.model.max_prompt_length,
        Duration::from_secs(5),
    );
    let limiter = Arc::new(InMemoryRateLimiter::new(limit, 3600));
    AppState::new(chat, limiter, config)
}

pub fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
