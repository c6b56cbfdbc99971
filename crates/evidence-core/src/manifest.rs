//! Integrity manifest binding hashed artifacts to one sealing run

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use shared_crypto::verify_hex_signature;
use shared_types::sha256_hex;

/// One sealed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    /// Lowercase hex SHA-256 of the artifact bytes
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub archive_member: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManifestStatus {
    Sealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    Unsigned,
    Valid,
    Invalid,
}

/// Aggregate digest: SHA-256 over the ascending, concatenated hex digests
///
/// Invariant to the order artifacts were discovered in.
pub fn compute_integrity_root<'a, I>(digests: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut sorted: Vec<&str> = digests.into_iter().collect();
    sorted.sort_unstable();
    sha256_hex(sorted.concat().as_bytes())
}

/// Message signed for a manifest
///
/// `<run_id>:<integrity_root>:<entries digest>`, where the entries digest
/// covers every entry's name, hash, size, member and capture time in
/// manifest order, so relabelling an entry invalidates the signature.
pub fn signing_payload(run_id: &str, integrity_root: &str, entries: &[ManifestEntry]) -> String {
    let mut listing = String::new();
    for entry in entries {
        listing.push_str(&format!(
            "{}\0{}\0{}\0{}\0{}\n",
            entry.file_name,
            entry.content_hash,
            entry.size_bytes,
            entry.archive_member,
            entry.captured_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        ));
    }
    format!("{}:{}:{}", run_id, integrity_root, sha256_hex(listing.as_bytes()))
}

/// Immutable record of one sealing event
///
/// Built only by the sealer; a re-seal produces a new manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    run_id: String,
    sealed_at: DateTime<Utc>,
    status: ManifestStatus,
    entries: Vec<ManifestEntry>,
    integrity_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signer_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

impl Manifest {
    pub(crate) fn new(
        run_id: String,
        sealed_at: DateTime<Utc>,
        entries: Vec<ManifestEntry>,
        integrity_root: String,
        signer_public_key: Option<String>,
        signature: Option<String>,
    ) -> Self {
        Self {
            run_id,
            sealed_at,
            status: ManifestStatus::Sealed,
            entries,
            integrity_root,
            signer_public_key,
            signature,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    pub fn status(&self) -> ManifestStatus {
        self.status
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn integrity_root(&self) -> &str {
        &self.integrity_root
    }

    pub fn signer_public_key(&self) -> Option<&str> {
        self.signer_public_key.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Recompute the root from the recorded entry digests
    pub fn recompute_root(&self) -> String {
        compute_integrity_root(self.entries.iter().map(|e| e.content_hash.as_str()))
    }

    pub fn verify_signature(&self) -> SignatureStatus {
        match (&self.signer_public_key, &self.signature) {
            (Some(key), Some(sig)) => {
                let payload = signing_payload(&self.run_id, &self.integrity_root, &self.entries);
                match verify_hex_signature(key, payload.as_bytes(), sig) {
                    Ok(true) => SignatureStatus::Valid,
                    _ => SignatureStatus::Invalid,
                }
            }
            (None, None) => SignatureStatus::Unsigned,
            _ => SignatureStatus::Invalid,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
