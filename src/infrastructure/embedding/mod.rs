mod local;
mod text;

pub use local::LocalEmbedding;
pub use text::TextEmbedding;
