//! Knowledge store: corpus ingestion and the in-memory snapshot it produces

use std::collections::BTreeSet;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shared_types::sha256_hex;

use crate::config::{CorpusConfig, RateLimitBackoff};
use crate::document::{KnowledgeChunk, Segment, SourceDocument, SourceFormat};
use crate::embeddings::EmbeddingProvider;
use crate::error::{EmbeddingError, IngestionError};
use crate::storage::{CacheFile, CacheState, CorpusFingerprint, KnowledgeCache};

/// Progress of an ingestion run
#[derive(Debug, Clone, PartialEq)]
pub struct IngestProgress {
    /// In `[0, 1]`, non-decreasing within a run
    pub fraction: f32,
    pub label: String,
}

/// Receives ingestion progress. Implemented for plain closures.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: IngestProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(IngestProgress) + Send + Sync,
{
    fn report(&self, progress: IngestProgress) {
        self(progress)
    }
}

/// Discards progress
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn report(&self, _progress: IngestProgress) {}
}

/// A document left out of the knowledge store, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub name: String,
    pub reason: String,
}

/// Immutable view of the knowledge store
///
/// Cheap to clone; readers keep their snapshot even while a new ingestion
/// replaces the cache underneath.
#[derive(Debug, Clone)]
pub struct KnowledgeSnapshot {
    fingerprint: CorpusFingerprint,
    embedding_model: String,
    dimension: usize,
    chunks: Arc<[KnowledgeChunk]>,
}

impl KnowledgeSnapshot {
    pub fn new(
        fingerprint: CorpusFingerprint,
        embedding_model: impl Into<String>,
        chunks: Vec<KnowledgeChunk>,
    ) -> Self {
        Self {
            fingerprint,
            embedding_model: embedding_model.into(),
            dimension: chunks.first().map(|c| c.dimension()).unwrap_or_default(),
            chunks: chunks.into(),
        }
    }

    pub fn fingerprint(&self) -> &CorpusFingerprint {
        &self.fingerprint
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    /// Distinct source documents represented in the snapshot
    pub fn sources(&self) -> BTreeSet<&str> {
        self.chunks.iter().map(|c| c.source()).collect()
    }
}

impl Deref for KnowledgeSnapshot {
    type Target = [KnowledgeChunk];

    fn deref(&self) -> &Self::Target {
        &self.chunks
    }
}

impl From<CacheFile> for KnowledgeSnapshot {
    fn from(file: CacheFile) -> Self {
        Self {
            fingerprint: file.fingerprint,
            embedding_model: file.embedding_model,
            dimension: file.dimension,
            chunks: file.chunks.into(),
        }
    }
}

/// Outcome of one ingestion run
#[derive(Debug)]
pub struct IngestReport {
    pub snapshot: KnowledgeSnapshot,
    /// The snapshot came straight from the cache, nothing was embedded
    pub cache_hit: bool,
    pub embedded_segments: usize,
    /// Segments the embedding service refused individually
    pub dropped_segments: usize,
    pub skipped: Vec<SkippedDocument>,
}

struct RawDocument {
    name: String,
    format: SourceFormat,
    digest: String,
    bytes: Vec<u8>,
}

pub struct KnowledgeStore {
    config: CorpusConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: KnowledgeCache,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn new(config: CorpusConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let cache = KnowledgeCache::new(config.cache_path.clone());
        Self {
            config,
            embedder,
            cache,
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn cache(&self) -> &KnowledgeCache {
        &self.cache
    }

    /// Build (or reload) the knowledge store for the corpus in `corpus_dir`
    ///
    /// Reuses the persisted cache without any embedding call when the corpus
    /// fingerprint and embedding model match. Otherwise every usable page is
    /// embedded and the cache is replaced atomically. Unreadable documents are
    /// skipped and reported; an embedding service outage aborts the run and
    /// leaves the previous cache untouched.
    pub async fn ingest(
        &self,
        corpus_dir: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<IngestReport, IngestionError> {
        // One ingestion at a time per store; concurrent callers wait and then
        // usually hit the cache the first one wrote.
        let _guard = self.write_lock.lock().await;

        progress.report(IngestProgress {
            fraction: 0.0,
            label: "scanning corpus".to_string(),
        });

        let paths = discover_documents(corpus_dir).await?;
        let mut skipped = Vec::new();
        let mut documents = Vec::with_capacity(paths.len());

        for (path, format) in paths {
            let name = file_name(&path);
            match tokio::fs::read(&path).await {
                Ok(bytes) => documents.push(RawDocument {
                    digest: sha256_hex(&bytes),
                    name,
                    format,
                    bytes,
                }),
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    skipped.push(SkippedDocument {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if documents.is_empty() {
            return Err(IngestionError::NoUsableDocuments(corpus_dir.to_path_buf()));
        }

        let fingerprint = CorpusFingerprint::compute(
            documents
                .iter()
                .map(|d| (d.name.as_str(), d.digest.as_str())),
            self.config.min_chunk_chars,
            self.config.max_chunk_chars,
        );
        let model = self.embedder.model_id().to_string();

        let lookup = self.cache.lookup(&fingerprint, &model);
        match (lookup.state, lookup.file) {
            (CacheState::Fresh(_), Some(file)) => {
                debug!("{} document(s) were unparsable when the cache was built", file.skipped.len());
                skipped.extend(file.skipped.iter().cloned());
                info!(
                    "Knowledge cache fresh ({} chunks, fingerprint {})",
                    file.chunks.len(),
                    &fingerprint.as_str()[..12]
                );
                progress.report(IngestProgress {
                    fraction: 1.0,
                    label: "loaded from cache".to_string(),
                });
                return Ok(IngestReport {
                    snapshot: KnowledgeSnapshot::from(file),
                    cache_hit: true,
                    embedded_segments: 0,
                    dropped_segments: 0,
                    skipped,
                });
            }
            (CacheState::Stale(reason), _) => info!("Rebuilding knowledge cache: {}", reason),
            (state, _) => info!("Building knowledge cache ({:?})", state),
        }

        let mut segments = Vec::new();
        let mut unparsable = Vec::new();
        for doc in &documents {
            match SourceDocument::from_bytes(doc.name.as_str(), doc.format, &doc.bytes) {
                Ok(source) => {
                    let found = source
                        .segments(self.config.min_chunk_chars, self.config.max_chunk_chars);
                    debug!("{}: {} pages, {} segments", doc.name, source.pages.len(), found.len());
                    segments.extend(found);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", doc.name, e);
                    unparsable.push(SkippedDocument {
                        name: doc.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        skipped.extend(unparsable.iter().cloned());

        if segments.is_empty() {
            return Err(IngestionError::NoUsableDocuments(corpus_dir.to_path_buf()));
        }

        let embedded_total = segments.len();
        let (chunks, dropped_segments) = self.embed_segments(segments, progress).await?;
        let dimension = chunks.first().map(|c| c.dimension()).unwrap_or_default();

        let file = CacheFile::new(fingerprint, model, dimension, chunks).with_skipped(unparsable);
        self.cache.commit(&file)?;

        info!(
            "Ingested {} chunks from {} documents ({} skipped, {} segments dropped)",
            file.chunks.len(),
            documents.len(),
            skipped.len(),
            dropped_segments
        );

        Ok(IngestReport {
            snapshot: KnowledgeSnapshot::from(file),
            cache_hit: false,
            embedded_segments: embedded_total - dropped_segments,
            dropped_segments,
            skipped,
        })
    }

    /// Ingest the directory named in the configuration
    pub async fn ingest_configured(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<IngestReport, IngestionError> {
        let dir = self.config.corpus_dir.clone();
        self.ingest(&dir, progress).await
    }

    async fn embed_segments(
        &self,
        segments: Vec<Segment>,
        progress: &dyn ProgressSink,
    ) -> Result<(Vec<KnowledgeChunk>, usize), IngestionError> {
        let total = segments.len();
        let ingested_at = Utc::now();
        let embedder = self.embedder.as_ref();
        let backoff = &self.config.rate_limit;

        // `buffered` keeps results in segment order
        let mut results = stream::iter(segments.into_iter().map(|segment| async move {
            let outcome = embed_with_backoff(embedder, &segment.content, backoff).await;
            (segment, outcome)
        }))
        .buffered(self.config.embedding_concurrency.max(1));

        let mut chunks = Vec::with_capacity(total);
        let mut dimension: Option<usize> = None;
        let mut dropped = 0;
        let mut last_rejection: Option<EmbeddingError> = None;
        let mut done = 0usize;

        while let Some((segment, outcome)) = results.next().await {
            done += 1;
            progress.report(IngestProgress {
                fraction: done as f32 / total as f32,
                label: format!("{} p.{}", segment.source, segment.page),
            });

            let vector = match outcome {
                Ok(vector) if !vector.is_empty() => vector,
                Ok(_) => {
                    warn!("Empty embedding for {} p.{}, dropped", segment.source, segment.page);
                    dropped += 1;
                    last_rejection = Some(EmbeddingError::InvalidResponse(
                        "empty embedding".to_string(),
                    ));
                    continue;
                }
                Err(e) if e.is_service_failure() => {
                    return Err(IngestionError::EmbeddingUnavailable(e));
                }
                Err(e) => {
                    warn!("Embedding refused for {} p.{}: {}", segment.source, segment.page, e);
                    dropped += 1;
                    last_rejection = Some(e);
                    continue;
                }
            };

            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected {
                return Err(IngestionError::DimensionMismatch {
                    source_name: segment.source,
                    page: segment.page,
                    expected,
                    actual: vector.len(),
                });
            }

            chunks.push(KnowledgeChunk::new(segment, vector, ingested_at));
        }

        if chunks.is_empty() {
            return Err(IngestionError::EmbeddingUnavailable(last_rejection.unwrap_or_else(
                || EmbeddingError::InvalidResponse("no segment could be embedded".to_string()),
            )));
        }

        Ok((chunks, dropped))
    }
}

/// Embed `text`, waiting out rate limits up to the configured attempt count
async fn embed_with_backoff(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    backoff: &RateLimitBackoff,
) -> Result<Vec<f32>, EmbeddingError> {
    let attempts = backoff.attempts();
    let mut attempt = 1;

    loop {
        match embedder.embed(text).await {
            Err(EmbeddingError::RateLimited(detail)) if attempt < attempts => {
                let delay = backoff.delay_after(attempt);
                warn!(
                    "Embedding rate limited ({}), attempt {}/{}, retrying in {:?}",
                    detail, attempt, attempts, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Supported files directly inside `dir`, sorted by file name
async fn discover_documents(dir: &Path) -> Result<Vec<(PathBuf, SourceFormat)>, IngestionError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestionError::CorpusNotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                debug!("Ignoring {}: {}", path.display(), e);
                continue;
            }
        }
        match SourceFormat::from_path(&path) {
            Some(format) => found.push((path, format)),
            None => debug!("Ignoring unsupported file {}", path.display()),
        }
    }

    found.sort_by_key(|(path, _)| file_name(path));
    Ok(found)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
