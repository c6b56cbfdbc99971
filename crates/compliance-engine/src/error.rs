//! Error types for deliberation

use shared_types::ComplianceState;
use thiserror::Error;

/// Failure reported by a reasoning oracle for a single call
#[derive(Debug, Error)]
pub enum OracleError {
    /// Timeout, rate limit, server error; worth retrying
    #[error("Transient oracle failure: {0}")]
    Transient(String),

    /// Authentication or request refused; retrying will not help
    #[error("Oracle rejected the request: {0}")]
    Rejected(String),

    /// The oracle answered, but not with a JSON document
    #[error("Oracle returned malformed content: {0}")]
    Malformed(String),
}

/// Why an oracle answer was not accepted as a verdict
///
/// Never returned as an `Err` from deliberation; it is recorded in the
/// downgraded verdict's key gap instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleValidationError {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    #[error("response does not match the verdict schema: {0}")]
    Schema(String),

    #[error("narrative is empty")]
    EmptyNarrative,

    #[error("{0} judgment cites no sources")]
    UncitedJudgment(ComplianceState),

    #[error("cited source '{0}' is not in the evidence set")]
    UnknownCitation(String),
}

/// Terminal deliberation failure, distinct from any verdict
#[derive(Debug, Error)]
pub enum DeliberationError {
    #[error("Reasoning oracle unavailable after {attempts} attempt(s): {last_error}")]
    OracleUnavailable { attempts: u32, last_error: String },

    #[error("Reasoning oracle refused the request: {0}")]
    OracleRejected(String),

    #[error("Could not build deliberation request: {0}")]
    Request(#[from] serde_json::Error),
}
