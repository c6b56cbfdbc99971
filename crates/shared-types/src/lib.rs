//! Shared data model for the GICES-RAGA compliance pipeline
//!
//! This crate holds the types that cross component boundaries:
//! - `DataPoint`: the caller-supplied reported metric under review
//! - `Verdict` and `ComplianceState`: the normalized deliberation outcome
//! - `EvidenceRef` and `AnalysisRecord`: the serialized analysis artifact
//! - `SealLedger`: the append-only, hash-linked record of sealing events
//! - SHA-256 digest helpers used for fingerprints and manifests

pub mod audit;
pub mod crypto;
pub mod types;

pub use audit::{LedgerError, SealLedger, SealRecord};
pub use crypto::{sha256, sha256_hex};
pub use types::{
    AnalysisRecord, ComplianceState, DataPoint, DataValue, EvidenceRef, RecordError, RiskLevel,
    Verdict, VerdictBasis,
};
