use std::collections::HashMap;

use crate::domain::{DomainError, Result};

/// Character-level vocabulary: the stoi/itos pair a model was trained with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    stoi: HashMap<char, u32>,
    itos: HashMap<u32, char>,
}

impl Vocabulary {
    /// Assigns ids in iteration order, skipping repeated characters.
    pub fn from_chars(chars: impl IntoIterator<Item = char>) -> Self {
        let mut stoi = HashMap::new();
        for ch in chars {
            let next = stoi.len() as u32;
            stoi.entry(ch).or_insert(next);
        }
        Self::from_mapping(stoi)
    }

    pub fn from_mapping(stoi: HashMap<char, u32>) -> Self {
        let itos = stoi.iter().map(|(&ch, &id)| (id, ch)).collect();
        Self { stoi, itos }
    }

    pub fn len(&self) -> usize {
        self.stoi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stoi.is_empty()
    }

    pub fn contains(&self, ch: char) -> bool {
        self.stoi.contains_key(&ch)
    }

    /// First character of `text` the model has no token for.
    pub fn first_unknown(&self, text: &str) -> Option<char> {
        text.chars().find(|ch| !self.contains(*ch))
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        text.chars()
            .map(|ch| {
                self.stoi.get(&ch).copied().ok_or_else(|| {
                    DomainError::validation(format!("character {ch:?} is not in the vocabulary"))
                })
            })
            .collect()
    }

    /// Ids without a character are skipped.
    pub fn decode(&self, ids: &[u32]) -> String {
        ids.iter().filter_map(|id| self.itos.get(id)).collect()
    }

    /// Drops every character the model cannot encode.
    pub fn retain_known(&self, text: &str) -> String {
        text.chars().filter(|ch| self.contains(*ch)).collect()
    }
}
