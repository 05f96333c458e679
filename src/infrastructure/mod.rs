pub mod config;
pub mod embedding;
pub mod memory_store;
pub mod model;
pub mod rate_limit;

pub use config::{AppConfig, ConfigError, EmbeddingBackend, MemoryBackend};
pub use embedding::{LocalEmbedding, TextEmbedding};
pub use memory_store::{InMemoryMemoryStore, QdrantMemoryStore, SupabaseMemoryStore};
pub use model::{CharGenerator, ModelPaths};
pub use rate_limit::{InMemoryRateLimiter, RedisRateLimiter};
