//! Wiring of the four pipeline stages
//!
//! Each function here is one CLI command minus argument parsing and output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use compliance_engine::{DeliberationOrchestrator, HttpReasoningOracle, ReasoningOracle};
use corpus_core::{
    EmbeddingProvider, HttpEmbeddingProvider, IngestProgress, IngestReport, KnowledgeStore,
    RetrievalEngine,
};
use evidence_core::{
    package, verify_package, write_package, EvidenceSealer, LedgerStore, VerificationReport,
};
use serde::Serialize;
use shared_crypto::{EphemeralIdentity, SigningIdentity};
use shared_types::{AnalysisRecord, DataPoint, VerdictBasis};
use tracing::{debug, info, warn};

use crate::config::RagaConfig;

fn embedder(config: &RagaConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = HttpEmbeddingProvider::new(&config.embedding)
        .context("Failed to set up the embedding client")?;
    Ok(Arc::new(provider))
}

fn log_progress(progress: IngestProgress) {
    debug!("[{:>3.0}%] {}", progress.fraction * 100.0, progress.label);
}

async fn ingest_with(
    config: &RagaConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<IngestReport> {
    let store = KnowledgeStore::new(config.corpus.clone(), embedder);
    let report = store
        .ingest_configured(&log_progress)
        .await
        .with_context(|| format!("Ingestion of {} failed", config.corpus.corpus_dir.display()))?;

    for skipped in &report.skipped {
        warn!("Skipped {}: {}", skipped.name, skipped.reason);
    }
    Ok(report)
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub corpus_dir: PathBuf,
    pub fingerprint: String,
    pub embedding_model: String,
    pub documents: usize,
    pub chunks: usize,
    pub cache_hit: bool,
    pub embedded_segments: usize,
    pub dropped_segments: usize,
    pub skipped: Vec<String>,
}

pub async fn ingest(config: &RagaConfig) -> Result<IngestSummary> {
    let report = ingest_with(config, embedder(config)?).await?;
    let snapshot = &report.snapshot;

    Ok(IngestSummary {
        corpus_dir: config.corpus.corpus_dir.clone(),
        fingerprint: snapshot.fingerprint().to_string(),
        embedding_model: snapshot.embedding_model().to_string(),
        documents: snapshot.sources().len(),
        chunks: snapshot.len(),
        cache_hit: report.cache_hit,
        embedded_segments: report.embedded_segments,
        dropped_segments: report.dropped_segments,
        skipped: report
            .skipped
            .iter()
            .map(|s| format!("{}: {}", s.name, s.reason))
            .collect(),
    })
}

pub fn read_data_point(path: &Path) -> Result<DataPoint> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data point {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid data point in {}", path.display()))
}

/// Ingest (normally a cache hit), retrieve and deliberate
pub async fn analyze(
    config: &RagaConfig,
    data_point: DataPoint,
    query: Option<String>,
    k: Option<usize>,
) -> Result<AnalysisRecord> {
    let embedder = embedder(config)?;
    let report = ingest_with(config, embedder.clone()).await?;

    let query = query.unwrap_or_else(|| data_point.default_query());
    let k = k.unwrap_or(config.corpus.top_k);

    let engine = RetrievalEngine::new(embedder, config.corpus.relevance_floor);
    let results = engine
        .retrieve(&query, &report.snapshot, k)
        .await
        .context("Retrieval failed")?;
    info!("Retrieved {} chunk(s) for \"{}\"", results.len(), query);

    let oracle: Arc<dyn ReasoningOracle> = Arc::new(
        HttpReasoningOracle::new(&config.oracle).context("Failed to set up the oracle client")?,
    );
    let orchestrator = DeliberationOrchestrator::new(oracle, &config.oracle);
    let evidence = orchestrator.evidence_for(&results);
    let verdict = orchestrator.deliberate_on(&data_point, &evidence).await?;

    if verdict.basis() == VerdictBasis::Downgraded {
        warn!("Verdict for {} is a degraded placeholder", data_point.id);
    }

    Ok(AnalysisRecord::new(data_point, query, verdict, evidence)
        .with_oracle_model(orchestrator.oracle_model()))
}

pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

#[derive(Debug, Serialize)]
pub struct SealSummary {
    pub run_id: String,
    pub integrity_root: String,
    pub artifacts: usize,
    pub signed: bool,
    pub package: PathBuf,
    pub ledger_sequence: u64,
}

fn signer(config: &RagaConfig) -> Result<Option<Arc<dyn SigningIdentity>>> {
    let Some(path) = &config.evidence.signing_key_path else {
        return Ok(None);
    };
    let hex_key = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read signing key {}", path.display()))?;
    let identity = EphemeralIdentity::from_private_key_hex(&hex_key)
        .with_context(|| format!("Invalid signing key in {}", path.display()))?;
    Ok(Some(Arc::new(identity)))
}

/// Seal an analysis record together with supporting files and record it
pub fn seal(
    config: &RagaConfig,
    analysis_path: &Path,
    supporting: &[PathBuf],
    out_dir: Option<&Path>,
) -> Result<SealSummary> {
    let json = std::fs::read_to_string(analysis_path)
        .with_context(|| format!("Failed to read analysis {}", analysis_path.display()))?;
    let record = AnalysisRecord::from_json(&json)
        .with_context(|| format!("Invalid analysis record in {}", analysis_path.display()))?;
    record
        .check_consistency()
        .with_context(|| format!("Refusing to seal {}", analysis_path.display()))?;

    let mut sealer = EvidenceSealer::new();
    if let Some(identity) = signer(config)? {
        sealer = sealer.with_signer(identity);
    }

    let mut files = vec![analysis_path.to_path_buf()];
    files.extend(supporting.iter().cloned());
    let artifacts =
        EvidenceSealer::evidence_artifacts(&record.data_point, &record.verdict, &files)?;

    let manifest = sealer.seal_artifacts(&artifacts).context("Seal aborted")?;
    let bytes = package(&manifest, &artifacts).context("Packaging failed")?;

    let (dir, ledger_path) = match out_dir {
        Some(dir) => (dir.to_path_buf(), dir.join("seal_ledger.json")),
        None => (
            config.evidence.output_dir.clone(),
            config.evidence.ledger_path.clone(),
        ),
    };
    let package_path = write_package(&dir, &manifest, &bytes)?;
    let ledger_record = LedgerStore::new(ledger_path).record(&manifest)?;

    Ok(SealSummary {
        run_id: manifest.run_id().to_string(),
        integrity_root: manifest.integrity_root().to_string(),
        artifacts: manifest.entries().len(),
        signed: manifest.signature().is_some(),
        package: package_path,
        ledger_sequence: ledger_record.sequence,
    })
}

pub fn verify(package_path: &Path) -> Result<VerificationReport> {
    let bytes = std::fs::read(package_path)
        .with_context(|| format!("Failed to read package {}", package_path.display()))?;
    verify_package(&bytes)
        .with_context(|| format!("Unreadable package {}", package_path.display()))
}

/// Fresh P-256 key written as hex; the public half is returned
pub fn keygen(path: &Path) -> Result<String> {
    let identity = EphemeralIdentity::generate();
    write_file(path, &identity.export_private_key_hex())?;
    Ok(identity.public_key_hex())
}
