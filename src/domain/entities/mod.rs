mod chat;
mod embedding;
mod generation;
mod rate_limit;
mod vocabulary;

pub use chat::{render_memory_context, ChatExchange, MemoryMatch};
pub use embedding::Embedding;
pub use generation::GenerationParams;
pub use rate_limit::RateDecision;
pub use vocabulary::Vocabulary;
