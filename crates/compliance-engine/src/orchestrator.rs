//! Deliberation: evidence plus data point in, validated verdict out

use std::sync::Arc;
use std::time::Duration;

use corpus_core::RetrievalResult;
use shared_types::{DataPoint, EvidenceRef, Verdict};
use tracing::{debug, info, warn};

use crate::config::{OracleConfig, RetryPolicy};
use crate::error::{DeliberationError, OracleError};
use crate::oracle::ReasoningOracle;
use crate::request::DeliberationRequest;
use crate::validation::validate_payload;

/// Key gap recorded when retrieval produced nothing to judge
pub const NO_EVIDENCE_GAP: &str =
    "No regulatory evidence was retrieved for this data point; check the corpus ingestion and the retrieval query.";

pub struct DeliberationOrchestrator {
    oracle: Arc<dyn ReasoningOracle>,
    retry: RetryPolicy,
    timeout: Duration,
    analyst_role: String,
    excerpt_chars: usize,
}

impl DeliberationOrchestrator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, config: &OracleConfig) -> Self {
        Self {
            oracle,
            retry: config.retry.clone(),
            timeout: config.timeout(),
            analyst_role: config.analyst_role.clone(),
            excerpt_chars: config.excerpt_chars,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn oracle_model(&self) -> &str {
        self.oracle.model_id()
    }

    /// Evidence exactly as it is shown to the oracle
    pub fn evidence_for(&self, results: &[RetrievalResult<'_>]) -> Vec<EvidenceRef> {
        results
            .iter()
            .map(|r| r.to_evidence(self.excerpt_chars))
            .collect()
    }

    /// Judge `data_point` against retrieved evidence
    ///
    /// Empty evidence yields a `NO_EVIDENCE` verdict without calling the
    /// oracle. Answers that fail validation are downgraded, never passed
    /// through. Exhausted retries and refused requests are errors.
    pub async fn deliberate(
        &self,
        data_point: &DataPoint,
        evidence: &[RetrievalResult<'_>],
    ) -> Result<Verdict, DeliberationError> {
        let evidence = self.evidence_for(evidence);
        self.deliberate_on(data_point, &evidence).await
    }

    /// Same as [`deliberate`](Self::deliberate) for already-owned evidence
    pub async fn deliberate_on(
        &self,
        data_point: &DataPoint,
        evidence: &[EvidenceRef],
    ) -> Result<Verdict, DeliberationError> {
        if evidence.is_empty() {
            info!("No evidence for {}, oracle not consulted", data_point.id);
            return Ok(Verdict::no_evidence_retrieved(NO_EVIDENCE_GAP));
        }

        let request = DeliberationRequest::build(data_point, evidence, &self.analyst_role)?;
        debug!(
            "Deliberating {} over {} evidence item(s) from {} source(s)",
            data_point.id,
            evidence.len(),
            request.allowed_sources().len()
        );

        let raw = match self.call_with_retry(&request).await {
            Ok(raw) => raw,
            Err(OracleError::Malformed(detail)) => {
                warn!("Oracle answer for {} is not JSON, downgrading", data_point.id);
                return Ok(Verdict::downgraded(format!("response is not valid JSON: {}", detail)));
            }
            Err(OracleError::Rejected(detail)) => {
                return Err(DeliberationError::OracleRejected(detail));
            }
            Err(OracleError::Transient(detail)) => {
                return Err(DeliberationError::OracleUnavailable {
                    attempts: self.retry.attempts(),
                    last_error: detail,
                });
            }
        };

        match validate_payload(&raw, request.allowed_sources()) {
            Ok(verdict) => {
                info!("{} judged {}", data_point.id, verdict.compliance_state());
                Ok(verdict)
            }
            Err(failure) => {
                warn!("Oracle answer for {} downgraded: {}", data_point.id, failure);
                Ok(Verdict::downgraded(failure))
            }
        }
    }

    /// Call the oracle, retrying transient failures with capped exponential backoff
    async fn call_with_retry(&self, request: &DeliberationRequest) -> Result<String, OracleError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(
                self.timeout,
                self.oracle.structured_judge(request),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(OracleError::Transient(format!(
                    "no answer within {}s",
                    self.timeout.as_secs_f32()
                ))),
            };

            match outcome {
                Err(OracleError::Transient(detail)) if attempt < attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "Oracle attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, attempts, detail, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
