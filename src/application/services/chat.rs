use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use super::MemoryService;
use crate::domain::{
    ports::TextGenerator, render_memory_context, ChatExchange, DomainError, Embedding,
    GenerationParams,
};

/// Returned instead of generated text while no trained model is loaded.
pub const PLACEHOLDER_RESPONSE: &str =
    "[AI is not trained yet. Please train the model with your own data.]";

/// Recall budget used when memory is attached without an explicit one.
pub const DEFAULT_MEMORY_TIMEOUT: Duration = Duration::from_secs(5);

/// The chat pipeline: validate, recall memories, generate under a deadline,
/// persist the exchange.
pub struct ChatService {
    generator: Option<Arc<dyn TextGenerator>>,
    memory: Option<Arc<MemoryService>>,
    max_prompt_length: usize,
    timeout: Duration,
    memory_timeout: Duration,
}

impl ChatService {
    pub fn new(
        generator: Option<Arc<dyn TextGenerator>>,
        max_prompt_length: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            memory: None,
            max_prompt_length,
            timeout,
            memory_timeout: DEFAULT_MEMORY_TIMEOUT,
        }
    }

    /// `timeout` bounds recall per request; on expiry the request continues
    /// without memory.
    pub fn with_memory(mut self, memory: Arc<MemoryService>, timeout: Duration) -> Self {
        self.memory = Some(memory);
        self.memory_timeout = timeout;
        self
    }

    pub fn model_loaded(&self) -> bool {
        self.generator.is_some()
    }

    pub fn memory(&self) -> Option<&Arc<MemoryService>> {
        self.memory.as_ref()
    }

    /// The response is the whole sequence the model saw and produced: recalled
    /// context, then the prompt, then the continuation.
    #[instrument(skip(self, prompt, params), fields(prompt_len = prompt.len()))]
    pub async fn respond(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        params: GenerationParams,
    ) -> Result<String, DomainError> {
        let Some(generator) = &self.generator else {
            warn!("model not loaded, returning placeholder response");
            return Ok(PLACEHOLDER_RESPONSE.to_string());
        };

        if prompt.is_empty() || prompt.chars().count() > self.max_prompt_length {
            return Err(DomainError::validation("Invalid prompt"));
        }
        let user_id = user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DomainError::unauthorized("User not authenticated"))?;
        params.validate()?;
        if let Some(ch) = generator.vocabulary().first_unknown(prompt) {
            return Err(DomainError::validation(format!(
                "Prompt contains unsupported character {ch:?}"
            )));
        }

        let (embedding, context) = match &self.memory {
            Some(memory) => {
                tokio::time::timeout(self.memory_timeout, recall_context(memory, prompt, user_id))
                    .await
                    .unwrap_or_else(|_| {
                        error!(
                            timeout_ms = self.memory_timeout.as_millis() as u64,
                            "memory recall timed out, continuing without memory"
                        );
                        (None, String::new())
                    })
            }
            None => (None, String::new()),
        };
        let full_prompt = format!("{}{prompt}", generator.vocabulary().retain_known(&context));

        let continuation = self
            .generate(generator.clone(), full_prompt.clone(), params)
            .await?;
        info!(generated_chars = continuation.chars().count(), "chat response generated");
        let text = full_prompt + &continuation;

        if let (Some(memory), Some(embedding)) = (&self.memory, embedding) {
            let exchange = ChatExchange::new(user_id, prompt, text.clone(), embedding);
            persist_in_background(memory.clone(), exchange);
        }

        Ok(text)
    }

    async fn generate(
        &self,
        generator: Arc<dyn TextGenerator>,
        prompt: String,
        params: GenerationParams,
    ) -> Result<String, DomainError> {
        let deadline = Instant::now() + self.timeout;
        let task =
            tokio::task::spawn_blocking(move || generator.generate(&prompt, &params, deadline));

        match tokio::time::timeout_at(deadline.into(), task).await {
            Err(_) => Err(DomainError::timeout("Request timed out")),
            Ok(Err(join_error)) => Err(DomainError::internal(format!(
                "generation task failed: {join_error}"
            ))),
            Ok(Ok(result)) => result,
        }
    }
}

/// Embeds the prompt and renders matching memories. Failures only cost the
/// context: an embedding that was produced is still returned for persistence.
async fn recall_context(
    memory: &MemoryService,
    prompt: &str,
    user_id: &str,
) -> (Option<Embedding>, String) {
    let embedding = match memory.embed(prompt).await {
        Ok(embedding) => embedding,
        Err(e) => {
            error!(error = %e, "failed to embed prompt, continuing without memory");
            return (None, String::new());
        }
    };

    let context = match memory.recall(&embedding, user_id).await {
        Ok(matches) => render_memory_context(&matches),
        Err(e) => {
            error!(error = %e, "failed to fetch memories, continuing without memory");
            String::new()
        }
    };

    (Some(embedding), context)
}

fn persist_in_background(memory: Arc<MemoryService>, exchange: ChatExchange) {
    tokio::spawn(async move {
        if let Err(e) = memory.remember(&exchange).await {
            if e.to_string().contains("embedding") {
                error!(
                    error = %e,
                    "failed to save chat: the chats table needs an 'embedding' column"
                );
            } else {
                error!(error = %e, "failed to save chat");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{EmbeddingService, MemoryStore};
    use crate::domain::{MemoryMatch, Vocabulary};
    use crate::infrastructure::InMemoryMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const CONTEXT: &str =
        "Relevant past conversations:\nUser: who are you\nAI: void\n\n---\nCurrent Conversation:\n";

    /// Records the prompt it was given and answers with a fixed string.
    struct ScriptedGenerator {
        vocab: Vocabulary,
        reply: String,
        seen: Mutex<Vec<String>>,
        delay: Duration,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                vocab: Vocabulary::from_chars(
                    (' '..='~').chain(['\n']),
                ),
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }

        fn last_prompt(&self) -> String {
            self.seen.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
            deadline: Instant,
        ) -> Result<String, DomainError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            std::thread::sleep(self.delay);
            if Instant::now() >= deadline {
                return Err(DomainError::timeout("too slow"));
            }
            Ok(self.reply.clone())
        }

        fn vocabulary(&self) -> &Vocabulary {
            &self.vocab
        }
    }

    struct ConstantEmbedding;

    #[async_trait]
    impl EmbeddingService for ConstantEmbedding {
        async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
            Ok(Embedding::new(vec![1.0, 0.0, 0.0]))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
            Ok(texts.iter().map(|_| Embedding::new(vec![1.0, 0.0, 0.0])).collect())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    /// A store whose search never completes.
    struct HangingStore;

    #[async_trait]
    impl MemoryStore for HangingStore {
        async fn match_relevant(
            &self,
            _query: &Embedding,
            _user_id: &str,
            _threshold: f32,
            _count: usize,
        ) -> Result<Vec<MemoryMatch>, DomainError> {
            std::future::pending().await
        }

        async fn insert(&self, _exchange: &ChatExchange) -> Result<(), DomainError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl MemoryStore for BrokenStore {
        async fn match_relevant(
            &self,
            _query: &Embedding,
            _user_id: &str,
            _threshold: f32,
            _count: usize,
        ) -> Result<Vec<MemoryMatch>, DomainError> {
            Err(DomainError::external("connection refused"))
        }

        async fn insert(&self, _exchange: &ChatExchange) -> Result<(), DomainError> {
            Err(DomainError::external("connection refused"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn service(generator: Arc<ScriptedGenerator>) -> ChatService {
        ChatService::new(Some(generator), 20, Duration::from_secs(5))
    }

    async fn wait_for_exchanges(store: &InMemoryMemoryStore, user: &str, n: usize) {
        for _ in 0..100 {
            if store.exchanges_for(user).len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("exchange was not persisted");
    }

    #[tokio::test]
    async fn test_placeholder_without_model() {
        let chat = ChatService::new(None, 20, Duration::from_secs(1));
        let text = chat
            .respond("", None, GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, PLACEHOLDER_RESPONSE);
        assert!(!chat.model_loaded());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_overlong_prompt() {
        let chat = service(Arc::new(ScriptedGenerator::new("ok")));

        for prompt in ["", "this prompt is far too long"] {
            let err = chat
                .respond(prompt, Some("u1"), GenerationParams::default())
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(m) if m == "Invalid prompt"));
        }
    }

    #[tokio::test]
    async fn test_requires_user() {
        let chat = service(Arc::new(ScriptedGenerator::new("ok")));

        for user in [None, Some(""), Some("  ")] {
            let err = chat
                .respond("hi", user, GenerationParams::default())
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::Unauthorized(_)));
        }
    }

    #[tokio::test]
    async fn test_rejects_characters_outside_vocabulary() {
        let chat = service(Arc::new(ScriptedGenerator::new("ok")));
        let err = chat
            .respond("héllo", Some("u1"), GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generates_without_memory() {
        let generator = Arc::new(ScriptedGenerator::new("hello there"));
        let chat = service(generator.clone());

        let text = chat
            .respond("hi", Some("u1"), GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(text, "hihello there");
        assert_eq!(generator.last_prompt(), "hi");
    }

    #[tokio::test]
    async fn test_memory_context_is_prepended_and_exchange_saved() {
        let store = Arc::new(InMemoryMemoryStore::new());
        store
            .insert(&ChatExchange::new(
                "u1",
                "who are you",
                "void",
                Embedding::new(vec![1.0, 0.0, 0.0]),
            ))
            .await
            .unwrap();
        let memory = Arc::new(MemoryService::new(
            Arc::new(ConstantEmbedding),
            store.clone(),
            0.75,
            5,
        ));
        let generator = Arc::new(ScriptedGenerator::new("still void"));
        let chat = service(generator.clone()).with_memory(memory, DEFAULT_MEMORY_TIMEOUT);

        let text = chat
            .respond("again?", Some("u1"), GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(generator.last_prompt(), format!("{CONTEXT}again?"));
        assert_eq!(text, format!("{CONTEXT}again?still void"));

        wait_for_exchanges(&store, "u1", 2).await;
        let saved = store.exchanges_for("u1");
        assert_eq!(saved[1].message, "again?");
        assert_eq!(saved[1].response, text);
    }

    #[tokio::test]
    async fn test_memory_failure_degrades_gracefully() {
        let memory = Arc::new(MemoryService::new(
            Arc::new(ConstantEmbedding),
            Arc::new(BrokenStore),
            0.75,
            5,
        ));
        let generator = Arc::new(ScriptedGenerator::new("fine"));
        let chat = service(generator.clone()).with_memory(memory, DEFAULT_MEMORY_TIMEOUT);

        let text = chat
            .respond("hi", Some("u1"), GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(text, "hifine");
        assert_eq!(generator.last_prompt(), "hi");
    }

    #[tokio::test]
    async fn test_stalled_memory_store_does_not_block_response() {
        let memory = Arc::new(MemoryService::new(
            Arc::new(ConstantEmbedding),
            Arc::new(HangingStore),
            0.75,
            5,
        ));
        let generator = Arc::new(ScriptedGenerator::new("answer"));
        let chat = service(generator.clone()).with_memory(memory, Duration::from_millis(50));

        let text = tokio::time::timeout(
            Duration::from_secs(2),
            chat.respond("hi", Some("u1"), GenerationParams::default()),
        )
        .await
        .expect("respond waited on the memory store")
        .unwrap();

        assert_eq!(text, "hianswer");
        assert_eq!(generator.last_prompt(), "hi");
    }

    #[tokio::test]
    async fn test_response_is_prompt_followed_by_continuation() {
        let chat = service(Arc::new(ScriptedGenerator::new(" world")));

        let text = chat
            .respond("hello", Some("u1"), GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_slow_generation_times_out() {
        let mut generator = ScriptedGenerator::new("late");
        generator.delay = Duration::from_millis(300);
        let chat = ChatService::new(Some(Arc::new(generator)), 20, Duration::from_millis(50));

        let err = chat
            .respond("hi", Some("u1"), GenerationParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Timeout(_)));
    }
}
