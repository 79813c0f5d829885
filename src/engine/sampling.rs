use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        for p in probs.iter_mut() {
            *p /= sum;
        }
    }
    probs
}

/// Draws from the `k` most likely accepted tokens after temperature
/// scaling. Returns the token and its unscaled probability, or `None` when
/// the accept filter rejects every token.
pub fn sample_top_k<R: Rng + ?Sized>(
    logits: &[f32],
    k: usize,
    temperature: f32,
    rng: &mut R,
    accept_token: &dyn Fn(u32) -> bool,
) -> Option<(u32, f32)> {
    let probs = softmax(logits);

    let mut candidates: Vec<(u32, f32)> = probs
        .iter()
        .enumerate()
        .map(|(i, p)| (i as u32, *p))
        .filter(|(i, _)| accept_token(*i))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let k = k.max(1).min(candidates.len());
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
        candidates.truncate(k);
    }
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    if k == 1 {
        return Some(candidates[0]);
    }

    let top = candidates[0].1.max(f32::MIN_POSITIVE).ln();
    let weights: Vec<f32> = candidates
        .iter()
        .map(|(_, p)| ((p.max(f32::MIN_POSITIVE).ln() - top) / temperature).exp())
        .collect();

    match WeightedIndex::new(&weights) {
        Ok(dist) => Some(candidates[dist.sample(rng)]),
        Err(_) => Some(candidates[0]),
    }
}
