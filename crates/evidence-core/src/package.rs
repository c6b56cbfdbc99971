//! Reproducible audit packages
//!
//! An audit package is a zip archive holding `manifest.json` followed by every
//! sealed artifact stored under its content-derived member name. Member names,
//! order, timestamps and permissions depend only on content, so two packages
//! for the same manifest are byte-identical regardless of where the artifacts
//! lived on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use shared_types::sha256_hex;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::artifact::{Artifact, HashedArtifact};
use crate::error::SealingError;
use crate::manifest::{Manifest, SignatureStatus};

pub const MANIFEST_MEMBER: &str = "manifest.json";
pub const STANDALONE_MANIFEST: &str = "evidence_manifest.json";

fn member_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

/// Bundle a manifest with the artifacts it describes
///
/// Every artifact is hashed again; content that no longer matches its
/// manifest entry is refused.
pub fn package(manifest: &Manifest, artifacts: &[Artifact]) -> Result<Vec<u8>, SealingError> {
    let hashed: Vec<HashedArtifact> = artifacts
        .par_iter()
        .map(HashedArtifact::load)
        .collect::<Result<_, _>>()?;

    let mut expected: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for entry in manifest.entries() {
        expected
            .entry(entry.file_name.as_str())
            .or_default()
            .insert(entry.content_hash.as_str());
    }

    let mut members: BTreeMap<String, &[u8]> = BTreeMap::new();
    let mut covered: BTreeSet<(&str, &str)> = BTreeSet::new();
    for artifact in &hashed {
        let digests = expected
            .get(artifact.name.as_str())
            .ok_or_else(|| SealingError::UnexpectedArtifact(artifact.name.clone()))?;
        if !digests.contains(artifact.digest.as_str()) {
            return Err(SealingError::ArtifactChanged {
                name: artifact.name.clone(),
                expected: digests.iter().next().copied().unwrap_or_default().to_string(),
                actual: artifact.digest.clone(),
            });
        }
        covered.insert((artifact.name.as_str(), artifact.digest.as_str()));
        members.insert(artifact.archive_member(), artifact.bytes.as_slice());
    }

    if let Some(entry) = manifest
        .entries()
        .iter()
        .find(|e| !covered.contains(&(e.file_name.as_str(), e.content_hash.as_str())))
    {
        return Err(SealingError::ArtifactMissing(PathBuf::from(&entry.file_name)));
    }

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = member_options();

        zip.start_file(MANIFEST_MEMBER, options)?;
        zip.write_all(manifest.to_json()?.as_bytes())?;

        for (member, bytes) in &members {
            zip.start_file(member.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;
    }

    info!(
        "Packaged {} ({} member(s), {} bytes)",
        manifest.run_id(),
        members.len() + 1,
        buffer.len()
    );
    Ok(buffer)
}

/// Write `<run_id>.zip` and the standalone manifest into `dir`
///
/// Returns the package path.
pub fn write_package(
    dir: &Path,
    manifest: &Manifest,
    package_bytes: &[u8],
) -> Result<PathBuf, SealingError> {
    std::fs::create_dir_all(dir)?;

    let package_path = dir.join(format!("{}.zip", manifest.run_id()));
    std::fs::write(&package_path, package_bytes)?;
    std::fs::write(dir.join(STANDALONE_MANIFEST), manifest.to_json()?)?;

    info!("Wrote {}", package_path.display());
    Ok(package_path)
}

/// A discrepancy between a package and its manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageMismatch {
    MissingMember {
        member: String,
    },
    DigestMismatch {
        member: String,
        expected: String,
        actual: String,
    },
    UnexpectedMember {
        member: String,
    },
    RootMismatch {
        recorded: String,
        recomputed: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub run_id: String,
    pub integrity_root: String,
    pub artifacts_checked: usize,
    pub signature: SignatureStatus,
    pub mismatches: Vec<PackageMismatch>,
}

impl VerificationReport {
    /// No mismatches and no bad signature (an unsigned package can be valid)
    pub fn is_valid(&self) -> bool {
        self.mismatches.is_empty() && self.signature != SignatureStatus::Invalid
    }
}

/// Check a package against the manifest it carries
pub fn verify_package(package_bytes: &[u8]) -> Result<VerificationReport, SealingError> {
    let mut archive = ZipArchive::new(Cursor::new(package_bytes))?;

    let manifest = {
        let mut json = String::new();
        archive.by_name(MANIFEST_MEMBER)?.read_to_string(&mut json)?;
        Manifest::from_json(&json)?
    };

    let mut members: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() || file.name() == MANIFEST_MEMBER {
            continue;
        }
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        members.insert(file.name().to_string(), bytes);
    }

    let mut mismatches = Vec::new();
    let mut referenced = BTreeSet::new();
    for entry in manifest.entries() {
        referenced.insert(entry.archive_member.as_str());
        match members.get(&entry.archive_member) {
            None => mismatches.push(PackageMismatch::MissingMember {
                member: entry.archive_member.clone(),
            }),
            Some(bytes) => {
                let actual = sha256_hex(bytes);
                if actual != entry.content_hash {
                    mismatches.push(PackageMismatch::DigestMismatch {
                        member: entry.archive_member.clone(),
                        expected: entry.content_hash.clone(),
                        actual,
                    });
                }
            }
        }
    }

    for member in members.keys() {
        if !referenced.contains(member.as_str()) {
            mismatches.push(PackageMismatch::UnexpectedMember {
                member: member.clone(),
            });
        }
    }

    let recomputed = manifest.recompute_root();
    if recomputed != manifest.integrity_root() {
        mismatches.push(PackageMismatch::RootMismatch {
            recorded: manifest.integrity_root().to_string(),
            recomputed,
        });
    }

    let report = VerificationReport {
        run_id: manifest.run_id().to_string(),
        integrity_root: manifest.integrity_root().to_string(),
        artifacts_checked: manifest.entries().len(),
        signature: manifest.verify_signature(),
        mismatches,
    };

    if report.is_valid() {
        info!("Package {} verified", report.run_id);
    } else {
        warn!(
            "Package {} failed verification: {} mismatch(es), signature {:?}",
            report.run_id,
            report.mismatches.len(),
            report.signature
        );
    }
    Ok(report)
}
