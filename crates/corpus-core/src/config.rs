//! Configuration for the knowledge store and the embedding capability
//!
//! Both sections deserialize from the `[corpus]` and `[embedding]` tables of the
//! application config file; every field has a default so partial tables work.
//! Environment variables override file values through `apply_env`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::search::{DEFAULT_RELEVANCE_FLOOR, DEFAULT_TOP_K};

/// Corpus ingestion and retrieval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory holding the regulatory source documents
    pub corpus_dir: PathBuf,
    /// Where the embedding cache is persisted
    pub cache_path: PathBuf,
    /// Segments shorter than this (after normalization) are discarded as noise
    pub min_chunk_chars: usize,
    /// Segments longer than this are truncated
    pub max_chunk_chars: usize,
    /// Embedding requests in flight at once during ingestion
    pub embedding_concurrency: usize,
    /// Minimum normalized similarity for a chunk to be returned
    pub relevance_floor: f32,
    /// Default number of chunks to retrieve
    pub top_k: usize,
    /// Backoff applied when the embedding service answers 429
    pub rate_limit: RateLimitBackoff,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("rag/knowledge_base"),
            cache_path: PathBuf::from("rag/knowledge_cache.json"),
            min_chunk_chars: 100,
            max_chunk_chars: 4000,
            embedding_concurrency: 4,
            relevance_floor: DEFAULT_RELEVANCE_FLOOR,
            top_k: DEFAULT_TOP_K,
            rate_limit: RateLimitBackoff::default(),
        }
    }
}

/// Bounded exponential backoff for rate-limited embedding calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitBackoff {
    /// Total calls per segment including the first; at least 1
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl RateLimitBackoff {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl CorpusConfig {
    pub fn with_corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.corpus_dir = dir.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitBackoff) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_chunk_bounds(mut self, min_chars: usize, max_chars: usize) -> Self {
        self.min_chunk_chars = min_chars;
        self.max_chunk_chars = max_chars.max(min_chars);
        self
    }

    /// Apply environment overrides
    ///
    /// - RAGA_CORPUS_DIR: corpus directory
    /// - RAGA_CACHE_PATH: embedding cache file
    pub fn apply_env(mut self) -> Self {
        if let Ok(dir) = std::env::var("RAGA_CORPUS_DIR") {
            self.corpus_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("RAGA_CACHE_PATH") {
            self.cache_path = PathBuf::from(path);
        }
        self
    }
}

/// Settings for the OpenAI-compatible embedding endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL; `/embeddings` is appended
    pub endpoint: String,
    pub model: String,
    /// Never written back out; usually supplied through OPENAI_API_KEY
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    /// Apply environment overrides
    ///
    /// - RAGA_EMBEDDING_ENDPOINT: base URL of the embedding service
    /// - RAGA_EMBEDDING_MODEL: embedding model name
    /// - OPENAI_API_KEY: bearer token
    pub fn apply_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("RAGA_EMBEDDING_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("RAGA_EMBEDDING_MODEL") {
            self.model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }
        self
    }
}
