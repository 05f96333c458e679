mod checkpoint;
mod generator;
mod gpt;
mod sampling;

pub use checkpoint::{load_meta, load_vocabulary, missing_files, ModelMeta, ModelPaths};
pub use generator::CharGenerator;
pub use gpt::{Gpt, GptConfig};
pub use sampling::sample_next;
