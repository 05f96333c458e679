use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{DomainError, Vocabulary};
use crate::infrastructure::config::ModelConfig;

/// Locations of the three files a trained model is made of.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub weights: PathBuf,
    pub vocab: PathBuf,
    pub meta: PathBuf,
}

impl From<&ModelConfig> for ModelPaths {
    fn from(config: &ModelConfig) -> Self {
        Self {
            weights: config.weights_path.clone(),
            vocab: config.vocab_path.clone(),
            meta: config.meta_path.clone(),
        }
    }
}

/// Architecture hyperparameters saved next to the weights.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelMeta {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_n_layer")]
    pub n_layer: usize,
    #[serde(default = "default_n_head")]
    pub n_head: usize,
    #[serde(default = "default_n_embd")]
    pub n_embd: usize,
    #[serde(default = "default_bias")]
    pub bias: bool,
}

fn default_block_size() -> usize {
    64
}

fn default_n_layer() -> usize {
    4
}

fn default_n_head() -> usize {
    4
}

fn default_n_embd() -> usize {
    128
}

fn default_bias() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct VocabFile {
    chars: Vec<String>,
    #[serde(default)]
    stoi: Option<HashMap<String, u32>>,
}

/// Human-readable descriptions of the model files that do not exist.
pub fn missing_files(paths: &ModelPaths) -> Vec<String> {
    [
        (&paths.weights, "Model weights"),
        (&paths.vocab, "Vocabulary file"),
        (&paths.meta, "Meta configuration"),
    ]
    .into_iter()
    .filter(|(path, _)| !path.exists())
    .map(|(path, description)| format!("{description}: {}", path.display()))
    .collect()
}

pub fn load_meta(path: &Path) -> Result<ModelMeta, DomainError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| DomainError::internal(format!("reading {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| DomainError::internal(format!("parsing {}: {e}", path.display())))
}

/// Reads `{"chars": [...], "stoi": {...}}`. Without `stoi`, ids follow the
/// order of `chars`.
pub fn load_vocabulary(path: &Path) -> Result<Vocabulary, DomainError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| DomainError::internal(format!("reading {}: {e}", path.display())))?;
    let file: VocabFile = serde_json::from_str(&raw)
        .map_err(|e| DomainError::internal(format!("parsing {}: {e}", path.display())))?;

    let chars = file
        .chars
        .iter()
        .map(|s| single_char(s))
        .collect::<Result<Vec<_>, _>>()?;

    let Some(stoi) = file.stoi else {
        return Ok(Vocabulary::from_chars(chars));
    };

    let mapping = stoi
        .iter()
        .map(|(s, &id)| single_char(s).map(|ch| (ch, id)))
        .collect::<Result<HashMap<_, _>, _>>()?;
    if mapping.len() != chars.len() {
        return Err(DomainError::internal(format!(
            "vocabulary lists {} characters but maps {}",
            chars.len(),
            mapping.len()
        )));
    }
    Ok(Vocabulary::from_mapping(mapping))
}

fn single_char(s: &str) -> Result<char, DomainError> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(DomainError::internal(format!(
            "vocabulary entry {s:?} is not a single character"
        ))),
    }
}
