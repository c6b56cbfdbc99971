//! Evidence sealing

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shared_crypto::SigningIdentity;
use shared_types::{DataPoint, Verdict};
use tracing::{debug, info};

use crate::artifact::{Artifact, HashedArtifact};
use crate::error::SealingError;
use crate::manifest::{compute_integrity_root, signing_payload, Manifest, ManifestEntry};

/// Where sealed evidence is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SealerConfig {
    pub output_dir: PathBuf,
    pub ledger_path: PathBuf,
    /// File holding a hex P-256 private key; manifests are unsigned without it
    pub signing_key_path: Option<PathBuf>,
}

impl Default for SealerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("evidence"),
            ledger_path: PathBuf::from("evidence/seal_ledger.json"),
            signing_key_path: None,
        }
    }
}

/// Hashes artifacts into immutable, optionally signed manifests
#[derive(Default)]
pub struct EvidenceSealer {
    signer: Option<Arc<dyn SigningIdentity>>,
}

impl EvidenceSealer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(mut self, signer: Arc<dyn SigningIdentity>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Full artifact set for an analysis: the data point and verdict as JSON
    /// plus the supporting files
    pub fn evidence_artifacts(
        data_point: &DataPoint,
        verdict: &Verdict,
        supporting_files: &[PathBuf],
    ) -> Result<Vec<Artifact>, SealingError> {
        let mut artifacts = vec![Artifact::data_point(data_point)?, Artifact::verdict(verdict)?];
        artifacts.extend(supporting_files.iter().cloned().map(Artifact::File));
        Ok(artifacts)
    }

    /// Seal a data point, its verdict and the supporting files
    pub fn seal(
        &self,
        data_point: &DataPoint,
        verdict: &Verdict,
        supporting_files: &[PathBuf],
    ) -> Result<Manifest, SealingError> {
        let artifacts = Self::evidence_artifacts(data_point, verdict, supporting_files)?;
        self.seal_artifacts(&artifacts)
    }

    /// Hash every artifact and bind them under a fresh run id
    ///
    /// Any missing or unreadable artifact aborts the seal; no manifest with
    /// phantom entries is ever produced.
    pub fn seal_artifacts(&self, artifacts: &[Artifact]) -> Result<Manifest, SealingError> {
        if artifacts.is_empty() {
            return Err(SealingError::NoArtifacts);
        }

        let hashed: Vec<HashedArtifact> = artifacts
            .par_iter()
            .map(HashedArtifact::load)
            .collect::<Result<_, _>>()?;

        let sealed_at = Utc::now();
        let mut entries: Vec<ManifestEntry> = hashed
            .iter()
            .map(|a| ManifestEntry {
                file_name: a.name.clone(),
                content_hash: a.digest.clone(),
                captured_at: sealed_at,
                size_bytes: a.bytes.len() as u64,
                archive_member: a.archive_member(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.file_name.as_str(), a.content_hash.as_str())
                .cmp(&(b.file_name.as_str(), b.content_hash.as_str()))
        });
        entries.dedup();

        let integrity_root =
            compute_integrity_root(entries.iter().map(|e| e.content_hash.as_str()));
        let run_id = new_run_id(sealed_at);

        let (signer_public_key, signature) = match &self.signer {
            Some(signer) => {
                let payload = signing_payload(&run_id, &integrity_root, &entries);
                (
                    Some(signer.public_key_hex()),
                    Some(signer.sign_hex(payload.as_bytes())),
                )
            }
            None => (None, None),
        };

        for entry in &entries {
            debug!("Sealed {} ({})", entry.file_name, &entry.content_hash[..12]);
        }
        info!(
            "Sealed {} artifact(s) as {} (root {})",
            entries.len(),
            run_id,
            &integrity_root[..16]
        );

        Ok(Manifest::new(
            run_id,
            sealed_at,
            entries,
            integrity_root,
            signer_public_key,
            signature,
        ))
    }
}

/// `SEAL-<UTC timestamp>-<random>`; unique even for seals in the same instant
fn new_run_id(at: DateTime<Utc>) -> String {
    format!(
        "SEAL-{}-{}",
        at.format("%Y%m%dT%H%M%S%.3fZ"),
        uuid::Uuid::new_v4().simple()
    )
}
