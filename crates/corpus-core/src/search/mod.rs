//! Retrieval over the knowledge store
//!
//! This module provides:
//! - Cosine similarity normalized to `[0, 1]`
//! - The `VectorIndex` seam with an exhaustive `FlatIndex`
//! - `RetrievalEngine`, which embeds a query and ranks chunks against it

pub mod similarity;
pub mod vector;

pub use similarity::{cosine_similarity, normalized_score, FlatIndex};
pub use vector::RetrievalEngine;

use shared_types::EvidenceRef;

use crate::document::KnowledgeChunk;
use crate::store::KnowledgeSnapshot;

/// Chunks scoring below this are never returned
pub const DEFAULT_RELEVANCE_FLOOR: f32 = 0.3;

/// Default number of chunks per query
pub const DEFAULT_TOP_K: usize = 5;

/// A chunk's position in a snapshot and its score against one query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub position: usize,
    pub score: f32,
}

/// Finds the chunks of a snapshot nearest to a query vector
///
/// Implementations return at most `limit` entries, all scoring at least
/// `floor`, ordered by non-increasing score with ties kept in snapshot order.
pub trait VectorIndex: Send + Sync {
    fn nearest(
        &self,
        snapshot: &KnowledgeSnapshot,
        query: &[f32],
        limit: usize,
        floor: f32,
    ) -> Vec<ScoredChunk>;
}

/// One retrieved chunk, borrowed from the snapshot it came from
#[derive(Debug, Clone, Copy)]
pub struct RetrievalResult<'a> {
    pub chunk: &'a KnowledgeChunk,
    pub score: f32,
}

impl RetrievalResult<'_> {
    /// Owned attribution record, with the excerpt cut to `excerpt_chars`
    pub fn to_evidence(&self, excerpt_chars: usize) -> EvidenceRef {
        EvidenceRef {
            source: self.chunk.source().to_string(),
            page: self.chunk.page(),
            score: self.score,
            excerpt: self.chunk.content().chars().take(excerpt_chars).collect(),
        }
    }
}
