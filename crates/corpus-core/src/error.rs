//! Error types for ingestion and retrieval

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by an embedding capability
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding service rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Embedding request rejected: {0}")]
    Rejected(String),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingError {
    /// Whether the service itself is failing, as opposed to a single input being refused
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Unavailable(_) | EmbeddingError::RateLimited(_)
        )
    }
}

/// Failure to read one source document. Never aborts an ingestion.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable PDF: {0}")]
    Pdf(String),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("Document is not valid UTF-8 text")]
    Encoding,
}

/// Failure reading or writing the embedding cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache could not be replaced atomically: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Corpus directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("No usable documents in corpus: {}", .0.display())]
    NoUsableDocuments(PathBuf),

    #[error("Embedding service unavailable, ingestion aborted: {0}")]
    EmbeddingUnavailable(#[source] EmbeddingError),

    #[error("Embedding dimension mismatch for {source_name} p.{page}: expected {expected}, got {actual}")]
    DimensionMismatch {
        source_name: String,
        page: u32,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Corpus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Query embedding failed: {0}")]
    QueryEmbedding(#[from] EmbeddingError),

    #[error("Knowledge store was embedded with '{store_model}' but the query embedder is '{query_model}'")]
    ModelMismatch {
        store_model: String,
        query_model: String,
    },

    #[error("Query vector has {actual} dimensions, knowledge store has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}
