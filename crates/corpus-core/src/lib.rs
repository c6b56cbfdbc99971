//! Corpus Core - Regulatory knowledge store and semantic retrieval
//!
//! This crate provides:
//! - Source document loading (PDF, plain text) and page segmentation
//! - The embedding capability seam and an HTTP implementation
//! - A persistent embedding cache keyed by corpus fingerprint
//! - `KnowledgeStore` ingestion producing immutable snapshots
//! - `RetrievalEngine` ranking chunks by normalized cosine similarity

pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod search;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::{CorpusConfig, EmbeddingConfig, RateLimitBackoff};
pub use document::{KnowledgeChunk, Segment, SourceDocument, SourceFormat};
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider};
pub use error::{CacheError, DocumentError, EmbeddingError, IngestionError, RetrievalError};
pub use search::{FlatIndex, RetrievalEngine, RetrievalResult, VectorIndex};
pub use storage::{CacheState, CorpusFingerprint, KnowledgeCache, StaleReason};
pub use store::{
    IngestProgress, IngestReport, KnowledgeSnapshot, KnowledgeStore, ProgressSink,
    SilentProgress, SkippedDocument,
};
