//! Evidence Core - Forensic sealing of analysis artifacts
//!
//! This crate provides:
//! - `EvidenceSealer`: parallel artifact hashing into an immutable manifest
//!   with an order-independent integrity root and optional P-256 signature
//! - Reproducible zip audit packages and their verification
//! - The on-disk, hash-linked ledger of every sealing event

pub mod artifact;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod package;
pub mod sealer;

pub use artifact::Artifact;
pub use error::SealingError;
pub use ledger::LedgerStore;
pub use manifest::{
    compute_integrity_root, signing_payload, Manifest, ManifestEntry, ManifestStatus,
    SignatureStatus,
};
pub use package::{
    package, verify_package, write_package, PackageMismatch, VerificationReport,
    MANIFEST_MEMBER, STANDALONE_MANIFEST,
};
pub use sealer::{EvidenceSealer, SealerConfig};
