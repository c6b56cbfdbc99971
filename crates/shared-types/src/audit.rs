//! Tamper-evident ledger of sealing events
//!
//! Every seal produces a new manifest; the ledger keeps one hash-linked
//! record per seal so the full history of sealing events can be audited,
//! not just the latest package.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger broken at record {index}: expected previous hash {expected:?}, found {found:?}")]
    BrokenLink {
        index: usize,
        expected: Option<String>,
        found: Option<String>,
    },

    #[error("Ledger sequence gap at record {index}: expected {expected}, found {found}")]
    SequenceGap {
        index: usize,
        expected: u64,
        found: u64,
    },

    #[error("Run id already recorded: {0}")]
    DuplicateRun(String),

    #[error("Ledger serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One sealing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealRecord {
    pub sequence: u64,
    pub run_id: String,
    pub integrity_root: String,
    pub sealed_at: String,
    pub previous_hash: Option<String>,
}

impl SealRecord {
    /// Compute the hash of this record (for chain linking)
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.run_id.as_bytes());
        hasher.update(self.integrity_root.as_bytes());
        hasher.update(self.sealed_at.as_bytes());
        if let Some(ref prev) = self.previous_hash {
            hasher.update(prev.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Append-only chain of seal records
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SealLedger {
    pub records: Vec<SealRecord>,
    pub created_at: String,
}

impl SealLedger {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Hash of the last record, used as the link for the next one
    pub fn last_hash(&self) -> Option<String> {
        self.records.last().map(|r| r.compute_hash())
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.records.iter().any(|r| r.run_id == run_id)
    }

    /// Append a seal event, linking it to the previous record
    pub fn append(
        &mut self,
        run_id: &str,
        integrity_root: &str,
        sealed_at: &str,
    ) -> Result<SealRecord, LedgerError> {
        if self.contains(run_id) {
            return Err(LedgerError::DuplicateRun(run_id.to_string()));
        }

        let record = SealRecord {
            sequence: self.records.len() as u64,
            run_id: run_id.to_string(),
            integrity_root: integrity_root.to_string(),
            sealed_at: sealed_at.to_string(),
            previous_hash: self.last_hash(),
        };
        self.records.push(record.clone());
        Ok(record)
    }

    /// Verify sequence numbers and hash links
    pub fn verify(&self) -> Result<(), LedgerError> {
        let mut expected_prev: Option<String> = None;

        for (i, record) in self.records.iter().enumerate() {
            if record.sequence != i as u64 {
                return Err(LedgerError::SequenceGap {
                    index: i,
                    expected: i as u64,
                    found: record.sequence,
                });
            }
            if record.previous_hash != expected_prev {
                return Err(LedgerError::BrokenLink {
                    index: i,
                    expected: expected_prev,
                    found: record.previous_hash.clone(),
                });
            }
            expected_prev = Some(record.compute_hash());
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        Ok(serde_json::from_str(json)?)
    }
}
