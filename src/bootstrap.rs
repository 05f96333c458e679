//! Wires configuration into the running service: model, chat memory and
//! rate limiter.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::application::{ChatService, MemoryService};
use crate::domain::ports::{EmbeddingService, MemoryStore, RateLimiter, TextGenerator};
use crate::domain::DomainError;
use crate::infrastructure::config::{
    AppConfig, EmbeddingBackend, EmbeddingConfig, MemoryConfig, RateLimitConfig,
};
use crate::infrastructure::model::{load_meta, load_vocabulary, missing_files};
use crate::infrastructure::rate_limit::create_pool;
use crate::infrastructure::{
    CharGenerator, InMemoryMemoryStore, InMemoryRateLimiter, LocalEmbedding, MemoryBackend,
    ModelPaths, QdrantMemoryStore, RedisRateLimiter, SupabaseMemoryStore, TextEmbedding,
};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("required model files are missing: {}", .0.join(", "))]
    MissingModelFiles(Vec<String>),

    #[error("rate limiter: {0}")]
    RateLimiter(#[source] DomainError),
}

/// Loads the trained model.
///
/// Missing files are fatal. Files that exist but fail to load leave the
/// service running without a model, answering with the placeholder text.
pub fn load_generator(paths: &ModelPaths) -> Result<Option<Arc<dyn TextGenerator>>, BootstrapError> {
    let missing = missing_files(paths);
    if !missing.is_empty() {
        for file in &missing {
            error!(file = %file, "model file not found");
        }
        return Err(BootstrapError::MissingModelFiles(missing));
    }

    match CharGenerator::load(paths) {
        Ok(generator) => Ok(Some(Arc::new(generator))),
        Err(e) => {
            error!(error = %e, "failed to load model, serving placeholder responses");
            Ok(None)
        }
    }
}

/// The local MiniLM model by default; OpenAI only when selected and keyed.
fn embedding_service(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>, DomainError> {
    match &config.backend {
        EmbeddingBackend::Local { model_dir } => Ok(Arc::new(LocalEmbedding::load(model_dir)?)),
        EmbeddingBackend::OpenAi { model } => {
            if !TextEmbedding::is_configured() {
                return Err(DomainError::validation(
                    "EMBEDDING_BACKEND=openai requires OPENAI_API_KEY",
                ));
            }
            Ok(Arc::new(TextEmbedding::new(model.as_str(), config.dimension)))
        }
    }
}

async fn memory_store(
    backend: &MemoryBackend,
    dimension: usize,
) -> Result<Option<Arc<dyn MemoryStore>>, DomainError> {
    let store: Arc<dyn MemoryStore> = match backend {
        MemoryBackend::Disabled => return Ok(None),
        MemoryBackend::InMemory => Arc::new(InMemoryMemoryStore::new()),
        MemoryBackend::Supabase { url, key } => {
            Arc::new(SupabaseMemoryStore::new(url.as_str(), key.as_str(), dimension)?)
        }
        MemoryBackend::Qdrant { url, collection } => {
            Arc::new(QdrantMemoryStore::new(url, collection, dimension).await?)
        }
    };
    Ok(Some(store))
}

/// Sets up chat memory. Any problem here disables memory instead of failing
/// startup.
pub async fn build_memory(
    memory: &MemoryConfig,
    embedding: &EmbeddingConfig,
) -> Option<Arc<MemoryService>> {
    if memory.backend == MemoryBackend::Disabled {
        info!("chat memory disabled");
        return None;
    }
    let embedder = match embedding_service(embedding) {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!(error = %e, "embedding model unavailable, chat memory disabled");
            return None;
        }
    };
    if embedder.dimension() != embedding.dimension {
        warn!(
            model = embedder.dimension(),
            configured = embedding.dimension,
            "embedding dimension differs from EMBEDDING_DIMENSION, chat memory disabled"
        );
        return None;
    }

    let store = match memory_store(&memory.backend, embedding.dimension).await {
        Ok(store) => store?,
        Err(e) => {
            error!(error = %e, "failed to connect memory store, chat memory disabled");
            return None;
        }
    };

    Some(Arc::new(MemoryService::new(
        embedder,
        store,
        memory.match_threshold,
        memory.match_count,
    )))
}

/// Logs setup problems of the memory store. The service starts regardless.
async fn report_memory_issues(memory: &MemoryService) {
    let issues = memory.diagnose().await;
    if issues.is_empty() {
        info!(store = memory.store_name(), "chat memory enabled");
    }
    for issue in issues {
        warn!(store = memory.store_name(), issue = %issue, "memory store setup problem");
    }
}

/// Redis when `REDIS_URL` is set, otherwise a process-local limiter with a
/// background sweep of expired clients.
pub fn build_rate_limiter(config: &RateLimitConfig) -> Result<Arc<dyn RateLimiter>, BootstrapError> {
    if let Some(url) = &config.redis_url {
        let pool = create_pool(url).map_err(BootstrapError::RateLimiter)?;
        info!(limit = config.requests, window_secs = config.window_secs, "redis rate limiter");
        return Ok(Arc::new(RedisRateLimiter::new(
            pool,
            config.requests,
            config.window_secs,
        )));
    }

    let limiter = Arc::new(InMemoryRateLimiter::new(config.requests, config.window_secs));
    spawn_sweeper(
        limiter.clone(),
        Duration::from_secs(config.window_secs).max(MIN_SWEEP_INTERVAL),
    );
    info!(limit = config.requests, window_secs = config.window_secs, "in-memory rate limiter");
    Ok(limiter)
}

fn spawn_sweeper(limiter: Arc<InMemoryRateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = limiter.purge_expired(chrono::Utc::now());
            if purged > 0 {
                tracing::debug!(purged, remaining = limiter.tracked_clients(), "rate limit sweep");
            }
        }
    });
}

/// Everything that would keep the service from running as configured, one
/// message per problem.
pub async fn verify_setup(config: &AppConfig) -> Vec<String> {
    let paths = ModelPaths::from(&config.model);
    let mut issues: Vec<String> = missing_files(&paths)
        .into_iter()
        .map(|file| format!("Missing required file: {file}"))
        .collect();

    if issues.is_empty() {
        if let Err(e) = CharGenerator::load(&paths) {
            issues.push(format!("Failed to load model: {e}"));
        }
    } else {
        if paths.vocab.exists() {
            if let Err(e) = load_vocabulary(&paths.vocab) {
                issues.push(format!("Failed to load vocabulary: {e}"));
            }
        }
        if paths.meta.exists() {
            if let Err(e) = load_meta(&paths.meta) {
                issues.push(format!("Failed to load meta: {e}"));
            }
        }
    }

    if !config.server.frontend_dir.is_dir() {
        issues.push(format!(
            "Missing frontend build directory: {}",
            config.server.frontend_dir.display()
        ));
    }

    if config.memory.backend != MemoryBackend::Disabled {
        match build_memory(&config.memory, &config.embedding).await {
            Some(memory) => issues.extend(
                memory
                    .diagnose()
                    .await
                    .into_iter()
                    .map(|issue| format!("Memory store: {issue}")),
            ),
            None => issues.push("Memory backend configured but could not be enabled".to_string()),
        }
    }

    issues
}

pub async fn build_state(config: AppConfig) -> Result<AppState, BootstrapError> {
    let generator = load_generator(&ModelPaths::from(&config.model))?;
    let mut chat = ChatService::new(
        generator,
        config.model.max_prompt_length,
        Duration::from_secs(config.model.generation_timeout_secs),
    );
    if let Some(memory) = build_memory(&config.memory, &config.embedding).await {
        report_memory_issues(&memory).await;
        chat = chat.with_memory(memory, Duration::from_secs(config.memory.timeout_secs));
    }
    let rate_limiter = build_rate_limiter(&config.rate_limit)?;

    Ok(AppState::new(chat, rate_limiter, config))
}
