use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingsBuilder;
use rig::providers::openai;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};

/// Sentence embeddings from a hosted embedding model.
///
/// The model is asked for `dimension`-sized vectors so they match the
/// `embedding` column of the chats table.
pub struct TextEmbedding {
    client: openai::Client,
    model: String,
    dimension: usize,
}

impl TextEmbedding {
    /// Reads the API key from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            client: openai::Client::from_env(),
            model: model.into(),
            dimension,
        }
    }

    /// Whether the credentials `from_config` needs are present.
    pub fn is_configured() -> bool {
        std::env::var("OPENAI_API_KEY").is_ok_and(|key| !key.is_empty())
    }

    fn to_embedding(vec: Vec<f64>) -> Embedding {
        Embedding::new(vec.into_iter().map(|x| x as f32).collect())
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let model = self
            .client
            .embedding_model_with_ndims(&self.model, self.dimension);

        let embeddings = EmbeddingsBuilder::new(model)
            .document(text)
            .map_err(|e| DomainError::external(e.to_string()))?
            .build()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .map(|(_doc, emb)| Self::to_embedding(emb.first().vec))
            .ok_or_else(|| DomainError::internal("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self
            .client
            .embedding_model_with_ndims(&self.model, self.dimension);

        let mut builder = EmbeddingsBuilder::new(model);
        for text in texts {
            builder = builder
                .document(*text)
                .map_err(|e| DomainError::external(e.to_string()))?;
        }

        let embeddings = builder
            .build()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        Ok(embeddings
            .into_iter()
            .map(|(_doc, emb)| Self::to_embedding(emb.first().vec))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
