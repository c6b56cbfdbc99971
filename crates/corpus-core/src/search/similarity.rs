//! Similarity scoring and the exhaustive index

use super::{ScoredChunk, VectorIndex};
use crate::store::KnowledgeSnapshot;

/// Cosine similarity in `[-1, 1]`
///
/// `None` when the lengths differ or either vector has zero magnitude; such
/// pairs have no meaningful direction and are never ranked.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 || !dot.is_finite() {
        return None;
    }

    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32)
}

/// Map a cosine in `[-1, 1]` onto a relevance score in `[0, 1]`
pub fn normalized_score(cosine: f32) -> f32 {
    ((cosine + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Brute-force scan over every chunk
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatIndex;

impl VectorIndex for FlatIndex {
    fn nearest(
        &self,
        snapshot: &KnowledgeSnapshot,
        query: &[f32],
        limit: usize,
        floor: f32,
    ) -> Vec<ScoredChunk> {
        if limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<ScoredChunk> = snapshot
            .chunks()
            .iter()
            .enumerate()
            .filter_map(|(position, chunk)| {
                let score = normalized_score(cosine_similarity(query, chunk.embedding())?);
                (score >= floor).then_some(ScoredChunk { position, score })
            })
            .collect();

        // Stable sort: equal scores keep snapshot order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let score = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
        assert!((normalized_score(score) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_and_orthogonal() {
        let opposite = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((normalized_score(opposite) - 0.0).abs() < 1e-6);

        let orthogonal = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((normalized_score(orthogonal) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
    }
}
