mod chat;
mod memory;
mod training;

pub use chat::{ChatService, PLACEHOLDER_RESPONSE};
pub use memory::MemoryService;
pub use training::{TrainingStatus, TrainingTracker};
