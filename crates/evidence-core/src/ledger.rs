//! On-disk seal ledger

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use shared_types::{SealLedger, SealRecord};
use tracing::{debug, info};

use crate::error::SealingError;
use crate::manifest::Manifest;

/// JSON file holding the hash-linked history of every seal
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and verify the ledger; a missing file is an empty ledger
    pub fn load_or_new(&self) -> Result<SealLedger, SealingError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No seal ledger at {}, starting a new one", self.path.display());
                return Ok(SealLedger::new());
            }
            Err(e) => return Err(e.into()),
        };

        let ledger = SealLedger::from_json(&json)?;
        ledger.verify()?;
        Ok(ledger)
    }

    /// Append one sealing event and persist the ledger atomically
    pub fn record(&self, manifest: &Manifest) -> Result<SealRecord, SealingError> {
        let mut ledger = self.load_or_new()?;
        let record = ledger.append(
            manifest.run_id(),
            manifest.integrity_root(),
            &manifest
                .sealed_at()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        self.persist(&ledger)?;

        info!(
            "Seal ledger: record {} for {} ({})",
            record.sequence,
            record.run_id,
            self.path.display()
        );
        Ok(record)
    }

    fn persist(&self, ledger: &SealLedger) -> Result<(), SealingError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            writer.write_all(ledger.to_json()?.as_bytes())?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
