//! Supporting artifacts to be sealed

use std::path::{Path, PathBuf};

use shared_types::{sha256_hex, DataPoint, Verdict};

use crate::error::SealingError;

/// A piece of evidence: a file on disk or bytes produced in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    File(PathBuf),
    Inline { name: String, bytes: Vec<u8> },
}

impl Artifact {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Artifact::File(path.into())
    }

    pub fn inline(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Artifact::Inline {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Pretty JSON of the data point under review
    pub fn data_point(data_point: &DataPoint) -> Result<Self, SealingError> {
        Ok(Self::inline("data_point.json", serde_json::to_vec_pretty(data_point)?))
    }

    /// Pretty JSON of the verdict being sealed
    pub fn verdict(verdict: &Verdict) -> Result<Self, SealingError> {
        Ok(Self::inline("verdict.json", serde_json::to_vec_pretty(verdict)?))
    }

    /// Name recorded in the manifest: the bare file name, never the path
    pub fn name(&self) -> String {
        match self {
            Artifact::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Artifact::Inline { name, .. } => name.clone(),
        }
    }

    /// Lowercase extension used in the archive member name
    pub fn extension(&self) -> String {
        let name = self.name();
        Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string())
    }

    pub fn read(&self) -> Result<Vec<u8>, SealingError> {
        match self {
            Artifact::File(path) => std::fs::read(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SealingError::ArtifactMissing(path.clone())
                } else {
                    SealingError::ArtifactUnreadable {
                        path: path.clone(),
                        source: e,
                    }
                }
            }),
            Artifact::Inline { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

/// Artifact contents with their digest
#[derive(Debug, Clone)]
pub(crate) struct HashedArtifact {
    pub name: String,
    pub extension: String,
    pub digest: String,
    pub bytes: Vec<u8>,
}

impl HashedArtifact {
    pub fn load(artifact: &Artifact) -> Result<Self, SealingError> {
        let bytes = artifact.read()?;
        Ok(Self {
            name: artifact.name(),
            extension: artifact.extension(),
            digest: sha256_hex(&bytes),
            bytes,
        })
    }

    /// Content-derived member name inside the audit package
    pub fn archive_member(&self) -> String {
        format!("artifacts/{}.{}", self.digest, self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_ignores_directories() {
        let a = Artifact::file("/tmp/run-1/reports/ESRS_E4.PDF");
        assert_eq!(a.name(), "ESRS_E4.PDF");
        assert_eq!(a.extension(), "pdf");
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(Artifact::inline("LICENSE", "x").extension(), "bin");
        assert_eq!(Artifact::inline("weird.t xt", "x").extension(), "bin");
    }

    #[test]
    fn test_missing_file() {
        let err = Artifact::file("/definitely/not/here.csv").read().unwrap_err();
        assert!(matches!(err, SealingError::ArtifactMissing(_)));
    }

    #[test]
    fn test_member_name_is_content_derived() {
        let a = HashedArtifact::load(&Artifact::inline("a.json", "{}")).unwrap();
        let b = HashedArtifact::load(&Artifact::inline("b.json", "{}")).unwrap();
        assert_eq!(a.archive_member(), b.archive_member());
        assert!(a.archive_member().starts_with("artifacts/"));
        assert!(a.archive_member().ends_with(".json"));
    }
}
