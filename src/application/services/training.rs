use serde::Serialize;
use std::sync::RwLock;
use tracing::{info, instrument};

use crate::domain::DomainError;

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingStatus {
    pub status: String,
    pub message: String,
}

impl TrainingStatus {
    fn new(status: &str, message: &str) -> Self {
        Self {
            status: status.to_string(),
            message: message.to_string(),
        }
    }
}

impl Default for TrainingStatus {
    fn default() -> Self {
        Self::new("idle", "")
    }
}

/// Accepts training submissions. Training itself happens offline; a
/// submission is only logged and recorded as the latest status.
#[derive(Default)]
pub struct TrainingTracker {
    status: RwLock<TrainingStatus>,
}

impl TrainingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn submit(&self, text: &str, user_id: Option<&str>) -> Result<TrainingStatus, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::validation("No training text provided."));
        }

        let preview: String = text.chars().take(PREVIEW_CHARS).collect();
        info!(
            user_id = user_id.unwrap_or("anonymous"),
            preview = %preview,
            "received training text"
        );

        let status = TrainingStatus::new("ok", "Training started (simulated).");
        if let Ok(mut current) = self.status.write() {
            *current = status.clone();
        }
        Ok(status)
    }

    pub fn status(&self) -> TrainingStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
