use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_EMBEDDING_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";
const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{0}")]
    Incomplete(String),
}

/// Service configuration, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub rate_limit: RateLimitConfig,
    pub memory: MemoryConfig,
    pub embedding: EmbeddingConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub weights_path: PathBuf,
    pub vocab_path: PathBuf,
    pub meta_path: PathBuf,
    pub max_prompt_length: usize,
    pub generation_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests: u64,
    pub window_secs: u64,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryBackend {
    Disabled,
    InMemory,
    Supabase { url: String, key: String },
    Qdrant { url: String, collection: String },
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    pub match_threshold: f32,
    pub match_count: usize,
    /// Upper bound on one recall (embed plus search) per chat request.
    pub timeout_secs: u64,
}

/// Where prompt embeddings come from.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 run in process with Candle. No API key needed.
    Local { model_dir: PathBuf },
    /// OpenAI embeddings through rig, keyed by `OPENAI_API_KEY`.
    OpenAi { model: String },
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub dimension: usize,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 10000,
                frontend_dir: PathBuf::from("frontend/dist/public"),
            },
            model: ModelConfig {
                weights_path: PathBuf::from("out/model.pt"),
                vocab_path: PathBuf::from("data/void/vocab.json"),
                meta_path: PathBuf::from("data/void/meta.json"),
                max_prompt_length: 1000,
                generation_timeout_secs: 30,
            },
            rate_limit: RateLimitConfig {
                requests: 100,
                window_secs: 3600,
                redis_url: None,
            },
            memory: MemoryConfig {
                backend: MemoryBackend::Disabled,
                match_threshold: 0.75,
                match_count: 5,
                timeout_secs: 5,
            },
            embedding: EmbeddingConfig {
                backend: EmbeddingBackend::Local {
                    model_dir: PathBuf::from(DEFAULT_EMBEDDING_MODEL_DIR),
                },
                dimension: 384,
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("SERVER_HOST") {
            config.server.host = host;
        }
        parse_into(&get, "PORT", &mut config.server.port)?;
        if let Some(dir) = get("FRONTEND_DIR") {
            config.server.frontend_dir = dir.into();
        }

        if let Some(path) = get("MODEL_PATH") {
            config.model.weights_path = path.into();
        }
        if let Some(path) = get("VOCAB_PATH") {
            config.model.vocab_path = path.into();
        }
        if let Some(path) = get("META_PATH") {
            config.model.meta_path = path.into();
        }
        parse_into(&get, "MAX_PROMPT_LENGTH", &mut config.model.max_prompt_length)?;
        parse_into(
            &get,
            "GENERATION_TIMEOUT_SECS",
            &mut config.model.generation_timeout_secs,
        )?;

        parse_into(&get, "RATE_LIMIT_REQUESTS", &mut config.rate_limit.requests)?;
        parse_into(&get, "RATE_LIMIT_WINDOW", &mut config.rate_limit.window_secs)?;
        config.rate_limit.redis_url = get("REDIS_URL");

        config.embedding.backend = embedding_backend(&get)?;
        parse_into(&get, "EMBEDDING_DIMENSION", &mut config.embedding.dimension)?;

        parse_into(
            &get,
            "MEMORY_MATCH_THRESHOLD",
            &mut config.memory.match_threshold,
        )?;
        parse_into(&get, "MEMORY_MATCH_COUNT", &mut config.memory.match_count)?;
        parse_into(&get, "MEMORY_TIMEOUT_SECS", &mut config.memory.timeout_secs)?;
        config.memory.backend = memory_backend(&get)?;

        if let Some(origins) = get("CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        Ok(config)
    }
}

fn parse_into<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = get(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value })?;
    }
    Ok(())
}

fn embedding_backend(
    get: &impl Fn(&str) -> Option<String>,
) -> Result<EmbeddingBackend, ConfigError> {
    let kind = get("EMBEDDING_BACKEND").map(|k| k.trim().to_ascii_lowercase());
    match kind.as_deref() {
        None | Some("local") => Ok(EmbeddingBackend::Local {
            model_dir: get("EMBEDDING_MODEL_DIR")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL_DIR.to_string())
                .into(),
        }),
        Some("openai") => Ok(EmbeddingBackend::OpenAi {
            model: get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        }),
        Some(other) => Err(ConfigError::Invalid {
            key: "EMBEDDING_BACKEND",
            value: other.to_string(),
        }),
    }
}

fn memory_backend(get: &impl Fn(&str) -> Option<String>) -> Result<MemoryBackend, ConfigError> {
    let supabase = get("SUPABASE_URL")
        .or_else(|| get("VITE_SUPABASE_URL"))
        .zip(get("SUPABASE_KEY").or_else(|| get("VITE_SUPABASE_ANON_KEY")));

    let kind = get("MEMORY_BACKEND").map(|k| k.trim().to_ascii_lowercase());
    match (kind.as_deref(), supabase) {
        (None | Some("supabase"), Some((url, key))) => Ok(MemoryBackend::Supabase { url, key }),
        (None | Some("none" | "disabled"), _) => Ok(MemoryBackend::Disabled),
        (Some("memory" | "in_memory"), _) => Ok(MemoryBackend::InMemory),
        (Some("supabase"), None) => Err(ConfigError::Incomplete(
            "MEMORY_BACKEND=supabase requires SUPABASE_URL and SUPABASE_KEY".to_string(),
        )),
        (Some("qdrant"), _) => {
            let url = get("QDRANT_URL").ok_or_else(|| {
                ConfigError::Incomplete("MEMORY_BACKEND=qdrant requires QDRANT_URL".to_string())
            })?;
            let collection = get("QDRANT_COLLECTION").unwrap_or_else(|| "chats".to_string());
            Ok(MemoryBackend::Qdrant { url, collection })
        }
        (Some(other), _) => Err(ConfigError::Invalid {
            key: "MEMORY_BACKEND",
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.rate_limit.requests, 100);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.model.max_prompt_length, 1000);
        assert_eq!(config.model.generation_timeout_secs, 30);
        assert_eq!(config.memory.backend, MemoryBackend::Disabled);
        assert_eq!(config.memory.match_count, 5);
        assert_eq!(config.memory.timeout_secs, 5);
        assert!(config.rate_limit.redis_url.is_none());
        assert_eq!(
            config.embedding.backend,
            EmbeddingBackend::Local {
                model_dir: PathBuf::from("models/all-MiniLM-L6-v2")
            }
        );
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_embedding_backend_selection() {
        let config = config_from(&[
            ("EMBEDDING_BACKEND", "openai"),
            ("EMBEDDING_MODEL", "text-embedding-3-large"),
            ("MEMORY_TIMEOUT_SECS", "2"),
        ])
        .unwrap();
        assert_eq!(
            config.embedding.backend,
            EmbeddingBackend::OpenAi {
                model: "text-embedding-3-large".to_string()
            }
        );
        assert_eq!(config.memory.timeout_secs, 2);

        let config = config_from(&[("EMBEDDING_MODEL_DIR", "/opt/minilm")]).unwrap();
        assert_eq!(
            config.embedding.backend,
            EmbeddingBackend::Local {
                model_dir: PathBuf::from("/opt/minilm")
            }
        );

        assert!(matches!(
            config_from(&[("EMBEDDING_BACKEND", "cohere")]),
            Err(ConfigError::Invalid { key: "EMBEDDING_BACKEND", .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("RATE_LIMIT_REQUESTS", "3"),
            ("MODEL_PATH", "weights/model.safetensors"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limit.requests, 3);
        assert_eq!(
            config.model.weights_path,
            PathBuf::from("weights/model.safetensors")
        );
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_invalid_number() {
        let err = config_from(&[("RATE_LIMIT_WINDOW", "an hour")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RATE_LIMIT_WINDOW", .. }));
    }

    #[test]
    fn test_supabase_detected_from_vite_variables() {
        let config = config_from(&[
            ("VITE_SUPABASE_URL", "https://db.example"),
            ("VITE_SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();
        assert_eq!(
            config.memory.backend,
            MemoryBackend::Supabase {
                url: "https://db.example".to_string(),
                key: "anon".to_string(),
            }
        );
    }

    #[test]
    fn test_explicit_backend_without_credentials() {
        assert!(matches!(
            config_from(&[("MEMORY_BACKEND", "supabase")]),
            Err(ConfigError::Incomplete(_))
        ));
        assert!(matches!(
            config_from(&[("MEMORY_BACKEND", "qdrant")]),
            Err(ConfigError::Incomplete(_))
        ));
    }

    #[test]
    fn test_memory_backend_can_be_disabled() {
        let config = config_from(&[
            ("MEMORY_BACKEND", "none"),
            ("SUPABASE_URL", "https://db.example"),
            ("SUPABASE_KEY", "anon"),
        ])
        .unwrap();
        assert_eq!(config.memory.backend, MemoryBackend::Disabled);
    }
}
