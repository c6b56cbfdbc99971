use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reported value of a data point: either a number or free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Number(n) => write!(f, "{}", n),
            DataValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[serde(alias = "Low", alias = "low")]
    Low,
    #[serde(alias = "Medium", alias = "medium")]
    Medium,
    #[serde(alias = "High", alias = "high")]
    High,
}

/// A reported metric under review (e.g. an ESRS E4 biodiversity disclosure)
///
/// Supplied by the caller and only ever borrowed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: String,
    pub value: DataValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub project: String,
    #[serde(default, alias = "risk", skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
}

impl DataPoint {
    /// Retrieval query used when the caller does not supply one
    pub fn default_query(&self) -> String {
        let mut parts = vec![self.id.as_str(), self.project.as_str()];
        if let Some(methodology) = &self.methodology {
            parts.push(methodology);
        }
        if let Some(unit) = &self.unit {
            parts.push(unit);
        }
        parts.join(" ")
    }
}

/// Canonical compliance outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceState {
    Compliant,
    AtRisk,
    NonCompliant,
    NoEvidence,
}

impl ComplianceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceState::Compliant => "COMPLIANT",
            ComplianceState::AtRisk => "AT_RISK",
            ComplianceState::NonCompliant => "NON_COMPLIANT",
            ComplianceState::NoEvidence => "NO_EVIDENCE",
        }
    }

    /// Whether this state expresses a judgment about the regulation
    pub fn is_judgment(&self) -> bool {
        !matches!(self, ComplianceState::NoEvidence)
    }
}

impl fmt::Display for ComplianceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a verdict came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictBasis {
    /// The oracle answered and the answer passed validation
    Judged,
    /// Retrieval produced no evidence, the oracle was never asked
    NoEvidenceRetrieved,
    /// The oracle answered but the answer failed validation
    Downgraded,
}

/// Normalized outcome of one deliberation run
///
/// Fields are private: a verdict is built once through one of the
/// constructors and is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    narrative: String,
    compliance_state: ComplianceState,
    citations: BTreeSet<String>,
    #[serde(default)]
    key_gap: Option<String>,
    #[serde(default)]
    reasoning_trace: Vec<String>,
    basis: VerdictBasis,
}

impl Verdict {
    /// A validated oracle judgment
    pub fn judged(
        narrative: String,
        compliance_state: ComplianceState,
        citations: BTreeSet<String>,
        key_gap: Option<String>,
        reasoning_trace: Vec<String>,
    ) -> Self {
        Self {
            narrative,
            compliance_state,
            citations,
            key_gap,
            reasoning_trace,
            basis: VerdictBasis::Judged,
        }
    }

    /// Placeholder for a run where retrieval found nothing to deliberate on
    pub fn no_evidence_retrieved(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            narrative: "No regulatory evidence was available, so no compliance judgment was made."
                .to_string(),
            compliance_state: ComplianceState::NoEvidence,
            citations: BTreeSet::new(),
            key_gap: Some(reason),
            reasoning_trace: Vec::new(),
            basis: VerdictBasis::NoEvidenceRetrieved,
        }
    }

    /// Placeholder for an oracle answer that failed validation
    pub fn downgraded(validation_failure: impl fmt::Display) -> Self {
        Self {
            narrative: "The reasoning oracle returned an answer that failed validation; \
                        it was discarded and no compliance judgment was made."
                .to_string(),
            compliance_state: ComplianceState::NoEvidence,
            citations: BTreeSet::new(),
            key_gap: Some(format!("Oracle response rejected: {}", validation_failure)),
            reasoning_trace: Vec::new(),
            basis: VerdictBasis::Downgraded,
        }
    }

    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    pub fn compliance_state(&self) -> ComplianceState {
        self.compliance_state
    }

    pub fn citations(&self) -> &BTreeSet<String> {
        &self.citations
    }

    pub fn key_gap(&self) -> Option<&str> {
        self.key_gap.as_deref()
    }

    pub fn reasoning_trace(&self) -> &[String] {
        &self.reasoning_trace
    }

    pub fn basis(&self) -> VerdictBasis {
        self.basis
    }

    /// True when this verdict is a placeholder rather than a computed judgment
    pub fn is_degraded(&self) -> bool {
        self.basis != VerdictBasis::Judged
    }
}

/// Serializable attribution of one retrieved piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub source: String,
    pub page: u32,
    pub score: f32,
    pub excerpt: String,
}

/// Why a stored analysis record does not hold up against its own evidence
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("verdict cites '{0}', which is not in the recorded evidence")]
    CitationOutsideEvidence(String),

    #[error("{0} judgment cites no sources")]
    UncitedJudgment(ComplianceState),

    #[error("judged verdict has an empty narrative")]
    EmptyNarrative,

    #[error("{basis:?} placeholder carries state {state} with {citations} citation(s)")]
    PlaceholderWithJudgment {
        basis: VerdictBasis,
        state: ComplianceState,
        citations: usize,
    },
}

/// Analysis output artifact consumed by presentation layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub data_point: DataPoint,
    pub query: String,
    pub verdict: Verdict,
    pub evidence: Vec<EvidenceRef>,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_model: Option<String>,
}

impl AnalysisRecord {
    pub fn new(
        data_point: DataPoint,
        query: String,
        verdict: Verdict,
        evidence: Vec<EvidenceRef>,
    ) -> Self {
        Self {
            data_point,
            query,
            verdict,
            evidence,
            analyzed_at: Utc::now(),
            oracle_model: None,
        }
    }

    pub fn with_oracle_model(mut self, model: impl Into<String>) -> Self {
        self.oracle_model = Some(model.into());
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Re-check the verdict against the evidence stored beside it
    ///
    /// A record read back from disk is only as trustworthy as this check:
    /// every citation must name a recorded evidence source, a judgment must
    /// cite something, and a placeholder must not carry a judgment.
    pub fn check_consistency(&self) -> Result<(), RecordError> {
        let verdict = &self.verdict;
        let sources: BTreeSet<&str> = self.evidence.iter().map(|e| e.source.as_str()).collect();

        if let Some(unknown) = verdict
            .citations()
            .iter()
            .find(|c| !sources.contains(c.as_str()))
        {
            return Err(RecordError::CitationOutsideEvidence(unknown.clone()));
        }

        match verdict.basis() {
            VerdictBasis::Judged => {
                if verdict.narrative().trim().is_empty() {
                    return Err(RecordError::EmptyNarrative);
                }
                if verdict.compliance_state().is_judgment() && verdict.citations().is_empty() {
                    return Err(RecordError::UncitedJudgment(verdict.compliance_state()));
                }
            }
            basis => {
                if verdict.compliance_state().is_judgment() || !verdict.citations().is_empty() {
                    return Err(RecordError::PlaceholderWithJudgment {
                        basis,
                        state: verdict.compliance_state(),
                        citations: verdict.citations().len(),
                    });
                }
            }
        }
        Ok(())
    }
}
