//! Compliance Engine - Deliberation over retrieved regulatory evidence
//!
//! Builds a structured request from a reported data point and its evidence,
//! asks an external reasoning oracle for a judgment, and accepts the answer
//! only after strict schema and citation validation.

pub mod config;
pub mod error;
pub mod oracle;
pub mod orchestrator;
pub mod request;
pub mod validation;

pub use config::{OracleConfig, RetryPolicy};
pub use error::{DeliberationError, OracleError, OracleValidationError};
pub use oracle::{HttpReasoningOracle, ReasoningOracle};
pub use orchestrator::{DeliberationOrchestrator, NO_EVIDENCE_GAP};
pub use request::DeliberationRequest;
pub use validation::validate_payload;
