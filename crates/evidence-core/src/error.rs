//! Error types for sealing and packaging

use std::path::PathBuf;

use shared_types::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SealingError {
    #[error("Artifact not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Artifact unreadable: {}: {source}", .path.display())]
    ArtifactUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact '{name}' changed since sealing: manifest {expected}, now {actual}")]
    ArtifactChanged {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Artifact '{0}' is not part of the manifest")]
    UnexpectedArtifact(String),

    #[error("Nothing to seal")]
    NoArtifacts,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Seal ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
