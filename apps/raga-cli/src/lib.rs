//! GICES-RAGA command-line driver
//!
//! Loads `raga.toml`, builds the HTTP embedding and oracle clients, and runs
//! ingestion, analysis, sealing and package verification.

pub mod config;
pub mod pipeline;

pub use config::{RagaConfig, DEFAULT_CONFIG_FILE};
