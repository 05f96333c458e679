mod embedding;
mod generator;
mod memory_store;
mod rate_limiter;

pub use embedding::EmbeddingService;
pub use generator::TextGenerator;
pub use memory_store::MemoryStore;
pub use rate_limiter::RateLimiter;
