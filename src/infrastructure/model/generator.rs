use std::time::Instant;

use candle_core::{Device, Tensor};
use tracing::{info, instrument};

use super::{load_meta, load_vocabulary, sample_next, Gpt, GptConfig, ModelPaths};
use crate::domain::{ports::TextGenerator, DomainError, GenerationParams, Vocabulary};

fn model_error(e: candle_core::Error) -> DomainError {
    DomainError::internal(format!("model inference failed: {e}"))
}

/// The character-level GPT together with the vocabulary it was trained on.
pub struct CharGenerator {
    model: Gpt,
    vocab: Vocabulary,
    device: Device,
}

impl CharGenerator {
    pub fn new(model: Gpt, vocab: Vocabulary, device: Device) -> Result<Self, DomainError> {
        if model.config().vocab_size != vocab.len() {
            return Err(DomainError::internal(format!(
                "model expects {} tokens but the vocabulary has {}",
                model.config().vocab_size,
                vocab.len()
            )));
        }
        Ok(Self {
            model,
            vocab,
            device,
        })
    }

    #[instrument(skip_all, fields(weights = %paths.weights.display()))]
    pub fn load(paths: &ModelPaths) -> Result<Self, DomainError> {
        let meta = load_meta(&paths.meta)?;
        let vocab = load_vocabulary(&paths.vocab)?;
        info!(vocab_size = vocab.len(), "loaded vocabulary");

        let device = Device::Cpu;
        let config = GptConfig::from_meta(&meta, vocab.len());
        let model = Gpt::load(&paths.weights, config, &device).map_err(|e| {
            DomainError::internal(format!("loading {}: {e}", paths.weights.display()))
        })?;
        info!(
            n_layer = config.n_layer,
            n_head = config.n_head,
            n_embd = config.n_embd,
            block_size = config.block_size,
            "model loaded"
        );

        Self::new(model, vocab, device)
    }

    fn next_logits(&self, context: &[u32]) -> Result<Vec<f32>, DomainError> {
        let input = Tensor::new(context, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(model_error)?;
        self.model
            .forward(&input)
            .and_then(|logits| logits.squeeze(0))
            .and_then(|logits| logits.to_vec1::<f32>())
            .map_err(model_error)
    }
}

impl TextGenerator for CharGenerator {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        deadline: Instant,
    ) -> Result<String, DomainError> {
        let mut tokens = self.vocab.encode(prompt)?;
        if tokens.is_empty() {
            return Err(DomainError::validation("cannot continue an empty prompt"));
        }

        let block_size = self.model.config().block_size;
        let prompt_len = tokens.len();
        let mut rng = rand::thread_rng();

        for _ in 0..params.max_new_tokens {
            if Instant::now() >= deadline {
                return Err(DomainError::timeout("generation exceeded its time budget"));
            }
            let window = &tokens[tokens.len().saturating_sub(block_size)..];
            let logits = self.next_logits(window)?;
            let next = sample_next(&logits, params.temperature, params.top_k, &mut rng);
            tokens.push(next as u32);
        }

        Ok(self.vocab.decode(&tokens[prompt_len..]))
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarBuilder;
    use std::time::Duration;

    fn zero_generator() -> CharGenerator {
        let vocab = Vocabulary::from_chars("abcd \n".chars());
        let config = GptConfig {
            vocab_size: vocab.len(),
            block_size: 8,
            n_layer: 1,
            n_head: 2,
            n_embd: 8,
            bias: true,
        };
        let device = Device::Cpu;
        let model = Gpt::new(config, VarBuilder::zeros(DType::F32, &device)).unwrap();
        CharGenerator::new(model, vocab, device).unwrap()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn test_generates_requested_number_of_characters() {
        let generator = zero_generator();
        let params = GenerationParams::from_options(Some(12), None, None);

        let text = generator.generate("abc", &params, far_deadline()).unwrap();

        assert_eq!(text.chars().count(), 12);
        assert!(text.chars().all(|c| generator.vocabulary().contains(c)));
    }

    #[test]
    fn test_prompt_longer_than_block_size_is_cropped() {
        let generator = zero_generator();
        let params = GenerationParams::from_options(Some(3), None, None);
        let prompt = "abcd abcd abcd\nabcd";

        let text = generator.generate(prompt, &params, far_deadline()).unwrap();

        assert_eq!(text.chars().count(), 3);
    }

    #[test]
    fn test_zero_new_tokens_returns_empty() {
        let generator = zero_generator();
        let params = GenerationParams::from_options(Some(0), None, None);
        assert_eq!(generator.generate("ab", &params, far_deadline()).unwrap(), "");
    }

    #[test]
    fn test_past_deadline_times_out() {
        let generator = zero_generator();
        let params = GenerationParams::default();

        let err = generator
            .generate("abc", &params, Instant::now() - Duration::from_millis(1))
            .unwrap_err();

        assert!(matches!(err, DomainError::Timeout(_)));
    }

    #[test]
    fn test_unknown_prompt_character() {
        let generator = zero_generator();
        let err = generator
            .generate("xyz", &GenerationParams::default(), far_deadline())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn test_vocab_size_mismatch_rejected() {
        let device = Device::Cpu;
        let config = GptConfig {
            vocab_size: 3,
            block_size: 4,
            n_layer: 1,
            n_head: 1,
            n_embd: 4,
            bias: false,
        };
        let model = Gpt::new(config, VarBuilder::zeros(DType::F32, &device)).unwrap();
        let vocab = Vocabulary::from_chars("ab".chars());
        assert!(CharGenerator::new(model, vocab, device).is_err());
    }
}
