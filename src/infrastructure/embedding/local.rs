//! all-MiniLM-L6-v2 sentence embeddings computed in process with Candle.
//!
//! Expects `config.json`, `tokenizer.json` and `model.safetensors` from the
//! sentence-transformers release in one directory. Vectors are mean pooled
//! over the attention mask and L2 normalized, matching what
//! `SentenceTransformer.encode` produces for this model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{info, instrument};

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};

pub const MODEL_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];

/// Longest input the model was trained on; longer prompts are truncated.
const MAX_SEQUENCE_LENGTH: usize = 256;

struct MiniLm {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

pub struct LocalEmbedding {
    inner: Arc<MiniLm>,
    dimension: usize,
}

impl LocalEmbedding {
    pub fn load(model_dir: &Path) -> Result<Self, DomainError> {
        let missing: Vec<PathBuf> = MODEL_FILES
            .iter()
            .map(|file| model_dir.join(file))
            .filter(|path| !path.exists())
            .collect();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
            return Err(DomainError::not_found(format!(
                "embedding model files missing: {}",
                names.join(", ")
            )));
        }

        let raw_config = std::fs::read_to_string(model_dir.join("config.json"))
            .map_err(|e| DomainError::internal(format!("failed to read config.json: {e}")))?;
        let config: Config = serde_json::from_str(&raw_config)
            .map_err(|e| DomainError::internal(format!("invalid config.json: {e}")))?;
        let dimension = hidden_size(&raw_config)?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| DomainError::internal(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| DomainError::internal(format!("failed to configure tokenizer: {e}")))?;

        let device = Device::Cpu;
        let weights = std::fs::read(model_dir.join("model.safetensors"))
            .map_err(|e| DomainError::internal(format!("failed to read weights: {e}")))?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DTYPE, &device)
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let model = BertModel::load(vb, &config)
            .map_err(|e| DomainError::internal(format!("failed to load embedding model: {e}")))?;

        info!(model_dir = %model_dir.display(), dimension, "local embedding model loaded");

        Ok(Self {
            inner: Arc::new(MiniLm {
                model,
                tokenizer,
                device,
            }),
            dimension,
        })
    }
}

impl MiniLm {
    fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| DomainError::internal(format!("tokenization failed: {e}")))?;

        let mask = encoding.get_attention_mask().to_vec();
        let token_states = self
            .forward(encoding.get_ids(), encoding.get_type_ids(), &mask)
            .map_err(|e| DomainError::internal(format!("embedding inference failed: {e}")))?;

        Ok(l2_normalize(&mean_pool(&token_states, &mask)))
    }

    /// Per-token hidden states for one sequence, `[seq_len][hidden]`.
    fn forward(
        &self,
        ids: &[u32],
        type_ids: &[u32],
        mask: &[u32],
    ) -> candle_core::Result<Vec<Vec<f32>>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(type_ids, &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(mask, &self.device)?.unsqueeze(0)?;

        self.model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?
            .squeeze(0)?
            .to_vec2()
    }
}

fn hidden_size(raw_config: &str) -> Result<usize, DomainError> {
    let value: serde_json::Value = serde_json::from_str(raw_config)
        .map_err(|e| DomainError::internal(format!("invalid config.json: {e}")))?;
    value["hidden_size"]
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| DomainError::internal("config.json has no hidden_size"))
}

/// Average of the token vectors whose mask entry is set.
fn mean_pool(token_states: &[Vec<f32>], mask: &[u32]) -> Vec<f32> {
    let hidden = token_states.first().map_or(0, Vec::len);
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (state, _) in token_states.iter().zip(mask).filter(|(_, m)| **m > 0) {
        for (acc, x) in sum.iter_mut().zip(state) {
            *acc += x;
        }
        count += 1.0;
    }

    if count > 0.0 {
        for x in &mut sum {
            *x /= count;
        }
    }
    sum
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|x| x / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[async_trait]
impl EmbeddingService for LocalEmbedding {
    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        let inner = self.inner.clone();
        let text = text.to_string();
        let vec = tokio::task::spawn_blocking(move || inner.embed(&text))
            .await
            .map_err(|e| DomainError::internal(format!("embedding task failed: {e}")))??;
        Ok(Embedding::new(vec))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
