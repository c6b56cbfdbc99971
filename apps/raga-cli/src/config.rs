//! Application configuration
//!
//! Loaded from a TOML file with one table per component:
//!
//! ```toml
//! [corpus]
//! corpus_dir = "rag/knowledge_base"
//!
//! [embedding]
//! model = "text-embedding-3-small"
//!
//! [oracle]
//! model = "gpt-4o"
//!
//! [evidence]
//! output_dir = "evidence"
//! ```
//!
//! Every table and field is optional. Environment overrides are applied
//! after the file.

use std::path::Path;

use anyhow::{Context, Result};
use compliance_engine::OracleConfig;
use corpus_core::{CorpusConfig, EmbeddingConfig};
use evidence_core::SealerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_FILE: &str = "raga.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagaConfig {
    pub corpus: CorpusConfig,
    pub embedding: EmbeddingConfig,
    pub oracle: OracleConfig,
    pub evidence: SealerConfig,
}

impl RagaConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In {}", path.display()))
    }

    /// Explicit path must exist; otherwise `raga.toml` is used when present
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Self::default()
            }
        };
        let config = config.apply_env();

        info!(
            "Config: corpus {}, embedding {}, oracle {}",
            config.corpus.corpus_dir.display(),
            config.embedding.model,
            config.oracle.model
        );
        Ok(config)
    }

    pub fn apply_env(self) -> Self {
        Self {
            corpus: self.corpus.apply_env(),
            embedding: self.embedding.apply_env(),
            oracle: self.oracle.apply_env(),
            evidence: self.evidence,
        }
    }
}
