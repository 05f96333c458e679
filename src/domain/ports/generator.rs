use std::time::Instant;

use crate::domain::{errors::DomainError, GenerationParams, Vocabulary};

/// Autoregressive text model. Generation is CPU-bound and blocking; callers
/// run it off the async executor.
pub trait TextGenerator: Send + Sync {
    /// Continues `prompt` and returns only the newly generated text.
    /// Fails with `DomainError::Timeout` once `deadline` passes.
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        deadline: Instant,
    ) -> Result<String, DomainError>;

    fn vocabulary(&self) -> &Vocabulary;
}
