use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Embedding;

/// One prompt/response pair, as stored in the `chats` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatExchange {
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

impl ChatExchange {
    pub fn new(
        user_id: impl Into<String>,
        message: impl Into<String>,
        response: impl Into<String>,
        embedding: Embedding,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            message: message.into(),
            response: response.into(),
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// A past exchange returned by a similarity lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMatch {
    pub message: String,
    pub response: String,
    #[serde(default)]
    pub similarity: f32,
}

impl MemoryMatch {
    pub fn new(message: impl Into<String>, response: impl Into<String>, similarity: f32) -> Self {
        Self {
            message: message.into(),
            response: response.into(),
            similarity,
        }
    }
}

const CONTEXT_HEADER: &str = "Relevant past conversations:\n";
const CONTEXT_FOOTER: &str = "\n---\nCurrent Conversation:\n";

/// Renders retrieved exchanges as a plain-text preamble for the prompt.
///
/// Stores return matches most-similar first; they are written out in reverse
/// so the most relevant exchange sits right before the current prompt.
/// Returns an empty string when there is nothing to recall.
pub fn render_memory_context(matches: &[MemoryMatch]) -> String {
    if matches.is_empty() {
        return String::new();
    }

    let mut context = String::from(CONTEXT_HEADER);
    for m in matches.iter().rev() {
        context.push_str("User: ");
        context.push_str(&m.message);
        context.push_str("\nAI: ");
        context.push_str(&m.response);
        context.push('\n');
    }
    context.push_str(CONTEXT_FOOTER);
    context
}
