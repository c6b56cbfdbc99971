//! Semantic retrieval over a knowledge snapshot
//!
//! The retrieval pipeline:
//! 1. Embed the query with the same capability that embedded the corpus
//! 2. Score every chunk by normalized cosine similarity
//! 3. Drop chunks under the relevance floor
//! 4. Return at most `k`, best first, ties in snapshot order
//!
//! # Example
//!
//! ```rust,no_run
//! use corpus_core::search::RetrievalEngine;
//! use corpus_core::store::KnowledgeSnapshot;
//! use corpus_core::embeddings::EmbeddingProvider;
//! use std::sync::Arc;
//!
//! # async fn example(embedder: Arc<dyn EmbeddingProvider>, snapshot: KnowledgeSnapshot)
//! # -> Result<(), corpus_core::RetrievalError> {
//! let engine = RetrievalEngine::new(embedder, 0.3);
//! for hit in engine.retrieve("permanence of restoration", &snapshot, 5).await? {
//!     println!("{} p.{} ({:.3})", hit.chunk.source(), hit.chunk.page(), hit.score);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::debug;

use super::{FlatIndex, RetrievalResult, VectorIndex, DEFAULT_RELEVANCE_FLOOR};
use crate::embeddings::EmbeddingProvider;
use crate::error::RetrievalError;
use crate::store::KnowledgeSnapshot;

pub struct RetrievalEngine<I = FlatIndex> {
    embedder: Arc<dyn EmbeddingProvider>,
    relevance_floor: f32,
    index: I,
}

impl RetrievalEngine<FlatIndex> {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, relevance_floor: f32) -> Self {
        Self::with_index(embedder, relevance_floor, FlatIndex)
    }
}

impl<I: VectorIndex> RetrievalEngine<I> {
    pub fn with_index(embedder: Arc<dyn EmbeddingProvider>, relevance_floor: f32, index: I) -> Self {
        let relevance_floor = if relevance_floor.is_finite() {
            relevance_floor.clamp(0.0, 1.0)
        } else {
            DEFAULT_RELEVANCE_FLOOR
        };
        Self {
            embedder,
            relevance_floor,
            index,
        }
    }

    pub fn relevance_floor(&self) -> f32 {
        self.relevance_floor
    }

    /// Retrieve up to `k` chunks relevant to `query`
    ///
    /// `k == 0` or an empty snapshot returns nothing without calling the
    /// embedding capability. A query embedding failure is an error, never an
    /// empty result.
    pub async fn retrieve<'s>(
        &self,
        query: &str,
        snapshot: &'s KnowledgeSnapshot,
        k: usize,
    ) -> Result<Vec<RetrievalResult<'s>>, RetrievalError> {
        if k == 0 || snapshot.is_empty() {
            return Ok(Vec::new());
        }

        if snapshot.embedding_model() != self.embedder.model_id() {
            return Err(RetrievalError::ModelMismatch {
                store_model: snapshot.embedding_model().to_string(),
                query_model: self.embedder.model_id().to_string(),
            });
        }

        let query_vector = self.embedder.embed(query).await?;
        let results = self.rank(&query_vector, snapshot, k)?;

        debug!(
            "Retrieved {} of {} chunks for query '{}' (k={}, floor={})",
            results.len(),
            snapshot.len(),
            query,
            k,
            self.relevance_floor
        );
        Ok(results)
    }

    /// Rank the snapshot against an already-embedded query
    pub fn rank<'s>(
        &self,
        query_vector: &[f32],
        snapshot: &'s KnowledgeSnapshot,
        k: usize,
    ) -> Result<Vec<RetrievalResult<'s>>, RetrievalError> {
        if k == 0 || snapshot.is_empty() {
            return Ok(Vec::new());
        }
        if query_vector.len() != snapshot.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: snapshot.dimension(),
                actual: query_vector.len(),
            });
        }

        let chunks = snapshot.chunks();
        Ok(self
            .index
            .nearest(snapshot, query_vector, k, self.relevance_floor)
            .into_iter()
            .filter_map(|hit| {
                chunks.get(hit.position).map(|chunk| RetrievalResult {
                    chunk,
                    score: hit.score,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{KnowledgeChunk, Segment};
    use crate::embeddings::EmbeddingProvider;
    use crate::error::EmbeddingError;
    use crate::storage::CorpusFingerprint;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed vector and counts calls
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                vector,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_id(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        fn model_id(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Unavailable("connection refused".into()))
        }
    }

    fn snapshot(vectors: Vec<Vec<f32>>) -> KnowledgeSnapshot {
        let chunks = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                KnowledgeChunk::new(
                    Segment {
                        source: format!("doc-{}.txt", i),
                        page: 1,
                        content: format!("chunk {}", i),
                    },
                    v,
                    Utc::now(),
                )
            })
            .collect();
        KnowledgeSnapshot::new(
            CorpusFingerprint::compute([("doc.txt", "00")], 1, 10),
            "fixed",
            chunks,
        )
    }

    #[tokio::test]
    async fn test_best_match_first() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
        let engine = RetrievalEngine::new(embedder, 0.3);
        let snap = snapshot(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]);

        let results = engine.retrieve("q", &snap, 3).await.unwrap();
        let sources: Vec<&str> = results.iter().map(|r| r.chunk.source()).collect();
        assert_eq!(sources, vec!["doc-1.txt", "doc-2.txt", "doc-0.txt"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_floor_excludes_weak_chunks() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
        let engine = RetrievalEngine::new(embedder, 0.3);
        // Opposite direction scores 0.0
        let snap = snapshot(vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);

        let results = engine.retrieve("q", &snap, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source(), "doc-1.txt");
    }

    #[tokio::test]
    async fn test_k_zero_skips_embedding() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
        let engine = RetrievalEngine::new(embedder.clone(), 0.3);
        let snap = snapshot(vec![vec![1.0, 0.0]]);

        let results = engine.retrieve("q", &snap, 0).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_snapshot_returns_nothing() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
        let engine = RetrievalEngine::new(embedder.clone(), 0.3);
        let snap = snapshot(vec![]);

        assert!(engine.retrieve("q", &snap, 5).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_embedding_failure_propagates() {
        let engine = RetrievalEngine::new(Arc::new(DownEmbedder), 0.3);
        let snap = snapshot(vec![vec![1.0, 0.0]]);

        let err = engine.retrieve("q", &snap, 5).await.unwrap_err();
        assert!(matches!(err, RetrievalError::QueryEmbedding(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0, 0.0]);
        let engine = RetrievalEngine::new(embedder, 0.3);
        let snap = snapshot(vec![vec![1.0, 0.0]]);

        let err = engine.retrieve("q", &snap, 5).await.unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_ties_keep_snapshot_order() {
        let engine = RetrievalEngine::new(FixedEmbedder::new(vec![]), 0.3);
        let snap = snapshot(vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]]);

        let results = engine.rank(&[1.0, 0.0], &snap, 3).unwrap();
        let sources: Vec<&str> = results.iter().map(|r| r.chunk.source()).collect();
        assert_eq!(sources, vec!["doc-0.txt", "doc-1.txt", "doc-2.txt"]);
    }

    #[test]
    fn test_zero_vector_chunk_never_ranked() {
        let engine = RetrievalEngine::new(FixedEmbedder::new(vec![]), 0.0);
        let snap = snapshot(vec![vec![0.0, 0.0], vec![0.0, 1.0]]);

        let results = engine.rank(&[0.0, 1.0], &snap, 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source(), "doc-1.txt");
    }

    #[test]
    fn test_evidence_excerpt_truncated() {
        let engine = RetrievalEngine::new(FixedEmbedder::new(vec![]), 0.3);
        let snap = snapshot(vec![vec![1.0, 0.0]]);
        let results = engine.rank(&[1.0, 0.0], &snap, 1).unwrap();

        let evidence = results[0].to_evidence(3);
        assert_eq!(evidence.excerpt, "chu");
        assert_eq!(evidence.source, "doc-0.txt");
        assert_eq!(evidence.page, 1);
    }

    fn vectors() -> impl Strategy<Value = Vec<Vec<f32>>> {
        prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..40)
    }

    proptest! {
        /// Property: Scores are non-increasing, within [floor, 1], and at most k are returned
        #[test]
        fn ranking_respects_order_floor_and_k(
            corpus in vectors(),
            query in prop::collection::vec(-1.0f32..1.0, 4),
            k in 0usize..50,
            floor in 0.0f32..1.0,
        ) {
            let engine = RetrievalEngine::new(FixedEmbedder::new(vec![]), floor);
            let snap = snapshot(corpus);
            let results = engine.rank(&query, &snap, k).unwrap();

            prop_assert!(results.len() <= k);
            prop_assert!(results.len() <= snap.len());
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for r in &results {
                prop_assert!(r.score >= floor);
                prop_assert!(r.score <= 1.0);
            }
        }

        /// Property: With k larger than the store, every chunk above the floor comes back
        #[test]
        fn large_k_returns_all_qualifying(
            corpus in vectors(),
            query in prop::collection::vec(0.1f32..1.0, 4),
        ) {
            let engine = RetrievalEngine::new(FixedEmbedder::new(vec![]), 0.3);
            let snap = snapshot(corpus);
            let qualifying = snap
                .chunks()
                .iter()
                .filter_map(|c| cosine_ok(&query, c.embedding()))
                .filter(|s| *s >= 0.3)
                .count();

            let results = engine.rank(&query, &snap, snap.len() + 10).unwrap();
            prop_assert_eq!(results.len(), qualifying);
        }
    }

    fn cosine_ok(a: &[f32], b: &[f32]) -> Option<f32> {
        crate::search::cosine_similarity(a, b).map(crate::search::normalized_score)
    }
}
