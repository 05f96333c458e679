use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Picks the next token id from raw logits.
///
/// Logits are divided by `temperature`, everything below the `top_k`-th
/// largest value is discarded, and the rest is sampled after a softmax.
/// A temperature of zero selects the argmax. `top_k` of zero, or at least
/// the vocabulary size, keeps every token.
pub fn sample_next<R: Rng + ?Sized>(
    logits: &[f32],
    temperature: f32,
    top_k: usize,
    rng: &mut R,
) -> usize {
    if logits.is_empty() {
        return 0;
    }
    if temperature <= 0.0 || !temperature.is_finite() {
        return argmax(logits);
    }

    let mut scaled: Vec<f32> = logits.iter().map(|l| l / temperature).collect();

    if top_k > 0 && top_k < scaled.len() {
        let mut sorted = scaled.clone();
        sorted.sort_unstable_by(|a, b| b.total_cmp(a));
        let cutoff = sorted[top_k - 1];
        for l in scaled.iter_mut().filter(|l| **l < cutoff) {
            *l = f32::NEG_INFINITY;
        }
    }

    let max = scaled.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = scaled.iter().map(|l| (l - max).exp()).collect();

    match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => argmax(logits),
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
