//! In-process similarity ranking.

use super::{ScoredChunk, StoredChunk};

/// Cosine similarity between two vectors.
///
/// Accumulates in `f64` so large components do not overflow. Returns `0.0` when either vector
/// has zero magnitude, the lengths differ, or a component is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    if similarity.is_finite() { similarity } else { 0.0 }
}

/// Score every chunk against `query`, sort descending, and keep the best `top_k`.
///
/// Ties keep their stored order so repeated calls return identical rankings.
pub fn rank_by_similarity(
    chunks: Vec<StoredChunk>,
    query: &[f32],
    top_k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let score = cosine_similarity(query, &chunk.vector);
            ScoredChunk { chunk, score }
        })
        .collect();

    scored.sort_by(|left, right| right.score.total_cmp(&left.score));
    scored.truncate(top_k);
    scored
}
