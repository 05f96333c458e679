use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_k: usize,
}

impl GenerationParams {
    pub const DEFAULT_MAX_NEW_TOKENS: usize = 100;
    pub const DEFAULT_TEMPERATURE: f32 = 0.8;
    pub const DEFAULT_TOP_K: usize = 200;

    /// Builds params from optional request fields, falling back to defaults.
    pub fn from_options(
        max_new_tokens: Option<usize>,
        temperature: Option<f32>,
        top_k: Option<usize>,
    ) -> Self {
        Self {
            max_new_tokens: max_new_tokens.unwrap_or(Self::DEFAULT_MAX_NEW_TOKENS),
            temperature: temperature.unwrap_or(Self::DEFAULT_TEMPERATURE),
            top_k: top_k.unwrap_or(Self::DEFAULT_TOP_K),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(DomainError::validation("Invalid temperature"));
        }
        Ok(())
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_options(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = GenerationParams::default();
        assert_eq!(params.max_new_tokens, 100);
        assert_eq!(params.temperature, 0.8);
        assert_eq!(params.top_k, 200);
    }

    #[test]
    fn test_negative_temperature_rejected() {
        let params = GenerationParams::from_options(None, Some(-1.0), None);
        assert!(matches!(params.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_zero_temperature_allowed() {
        let params = GenerationParams::from_options(Some(5), Some(0.0), Some(1));
        assert!(params.validate().is_ok());
    }
}
