//! Persistent embedding cache
//!
//! The cache is a single JSON file keyed by a fingerprint of the corpus
//! contents. It is only ever replaced whole: a new version is written to a
//! temporary file in the same directory and renamed over the old one, so a
//! crash mid-write leaves the previous cache intact.

use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::document::KnowledgeChunk;
use crate::error::CacheError;
use crate::store::SkippedDocument;

/// Bumped whenever the on-disk layout changes
pub const CACHE_FORMAT_VERSION: u32 = 2;

/// Digest identifying one exact corpus and segmentation setup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorpusFingerprint(String);

impl CorpusFingerprint {
    /// Fingerprint a corpus from `(document name, content digest)` pairs
    ///
    /// Order-independent over documents; any renamed, added, removed or
    /// edited file, or a change to the segmentation bounds, changes it.
    pub fn compute<'a, I>(documents: I, min_chunk_chars: usize, max_chunk_chars: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries: Vec<(&str, &str)> = documents.into_iter().collect();
        entries.sort_unstable();

        let mut hasher = Sha256::new();
        for (name, digest) in entries {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(digest.as_bytes());
            hasher.update(b"\n");
        }
        hasher.update(format!("segments:{}:{}", min_chunk_chars, max_chunk_chars).as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorpusFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an existing cache file cannot be reused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    CorpusChanged,
    ModelChanged { cached: String, current: String },
    FormatVersion(u32),
    InconsistentDimensions,
    Unreadable(String),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::CorpusChanged => f.write_str("corpus contents changed"),
            StaleReason::ModelChanged { cached, current } => {
                write!(f, "embedding model changed from '{}' to '{}'", cached, current)
            }
            StaleReason::FormatVersion(v) => write!(f, "cache format version {} unsupported", v),
            StaleReason::InconsistentDimensions => f.write_str("cached vectors disagree on dimension"),
            StaleReason::Unreadable(e) => write!(f, "cache unreadable: {}", e),
        }
    }
}

/// Freshness of the persisted cache relative to the current corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    Fresh(CorpusFingerprint),
    Stale(StaleReason),
    Missing,
}

/// On-disk cache layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub format_version: u32,
    pub fingerprint: CorpusFingerprint,
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub chunks: Vec<KnowledgeChunk>,
    /// Documents that were read but could not be parsed when the cache was built
    #[serde(default)]
    pub skipped: Vec<SkippedDocument>,
}

impl CacheFile {
    pub fn new(
        fingerprint: CorpusFingerprint,
        embedding_model: impl Into<String>,
        dimension: usize,
        chunks: Vec<KnowledgeChunk>,
    ) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            fingerprint,
            embedding_model: embedding_model.into(),
            dimension,
            created_at: Utc::now(),
            chunks,
            skipped: Vec::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedDocument>) -> Self {
        self.skipped = skipped;
        self
    }

    fn staleness(&self, fingerprint: &CorpusFingerprint, model: &str) -> Option<StaleReason> {
        if self.format_version != CACHE_FORMAT_VERSION {
            return Some(StaleReason::FormatVersion(self.format_version));
        }
        if self.embedding_model != model {
            return Some(StaleReason::ModelChanged {
                cached: self.embedding_model.clone(),
                current: model.to_string(),
            });
        }
        if &self.fingerprint != fingerprint {
            return Some(StaleReason::CorpusChanged);
        }
        if self.chunks.iter().any(|c| c.dimension() != self.dimension) {
            return Some(StaleReason::InconsistentDimensions);
        }
        None
    }
}

/// Result of looking up the cache: the state, plus the contents when fresh
#[derive(Debug)]
pub struct CacheLookup {
    pub state: CacheState,
    pub file: Option<CacheFile>,
}

pub struct KnowledgeCache {
    path: PathBuf,
}

impl KnowledgeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and classify the cache. Never fails: anything unusable is `Stale`.
    pub fn lookup(&self, fingerprint: &CorpusFingerprint, model: &str) -> CacheLookup {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CacheLookup {
                    state: CacheState::Missing,
                    file: None,
                }
            }
            Err(e) => return stale(StaleReason::Unreadable(e.to_string())),
        };

        let file: CacheFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => return stale(StaleReason::Unreadable(e.to_string())),
        };

        match file.staleness(fingerprint, model) {
            Some(reason) => stale(reason),
            None => CacheLookup {
                state: CacheState::Fresh(file.fingerprint.clone()),
                file: Some(file),
            },
        }
    }

    /// Atomically replace the cache with `file`
    pub fn commit(&self, file: &CacheFile) -> Result<(), CacheError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, file)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        tracing::debug!(
            "Cache committed: {} chunks -> {}",
            file.chunks.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Remove the cache file if present
    pub fn invalidate(&self) -> Result<(), CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn stale(reason: StaleReason) -> CacheLookup {
    CacheLookup {
        state: CacheState::Stale(reason),
        file: None,
    }
}
