//! Strict validation of oracle answers

use std::collections::BTreeSet;

use serde::Deserialize;
use shared_types::{ComplianceState, Verdict};

use crate::error::OracleValidationError;

/// The only answer shape accepted from an oracle
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OraclePayload {
    narrative: String,
    compliance_state: ComplianceState,
    citations: Vec<String>,
    #[serde(default)]
    key_gap: Option<String>,
    reasoning_trace: Vec<String>,
}

/// Turn a raw oracle answer into a judged verdict
///
/// Rejects anything outside the schema, empty narratives, uncited judgments
/// and citations naming sources absent from `allowed_sources`.
pub fn validate_payload(
    raw: &str,
    allowed_sources: &BTreeSet<String>,
) -> Result<Verdict, OracleValidationError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| OracleValidationError::NotJson(e.to_string()))?;
    let payload: OraclePayload =
        serde_json::from_value(value).map_err(|e| OracleValidationError::Schema(e.to_string()))?;

    let narrative = payload.narrative.trim();
    if narrative.is_empty() {
        return Err(OracleValidationError::EmptyNarrative);
    }

    let citations: BTreeSet<String> = payload
        .citations
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(unknown) = citations.iter().find(|c| !allowed_sources.contains(*c)) {
        return Err(OracleValidationError::UnknownCitation(unknown.clone()));
    }

    if payload.compliance_state.is_judgment() && citations.is_empty() {
        return Err(OracleValidationError::UncitedJudgment(payload.compliance_state));
    }

    let key_gap = payload
        .key_gap
        .map(|gap| gap.trim().to_string())
        .filter(|gap| !gap.is_empty());

    Ok(Verdict::judged(
        narrative.to_string(),
        payload.compliance_state,
        citations,
        key_gap,
        payload.reasoning_trace,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::VerdictBasis;

    fn sources() -> BTreeSet<String> {
        ["EU_2024_1991.pdf", "ESRS_E4.pdf"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_valid_payload() {
        let raw = r#"{
            "narrative": "The 50 ha restoration lacks a permanence commitment.",
            "compliance_state": "AT_RISK",
            "citations": [" EU_2024_1991.pdf", "EU_2024_1991.pdf"],
            "key_gap": "No permanence period reported",
            "reasoning_trace": ["Step 1: data", "Step 2: law", "Step 3: conclusion"]
        }"#;
        let verdict = validate_payload(raw, &sources()).unwrap();

        assert_eq!(verdict.compliance_state(), ComplianceState::AtRisk);
        assert_eq!(verdict.basis(), VerdictBasis::Judged);
        assert_eq!(verdict.citations().len(), 1);
        assert_eq!(verdict.key_gap(), Some("No permanence period reported"));
        assert_eq!(verdict.reasoning_trace().len(), 3);
    }

    #[test]
    fn test_legacy_shape_rejected() {
        let raw = r#"{
            "narrative": "Cumple.",
            "compliance_check": "CUMPLE",
            "citations": ["EU_2024_1991.pdf"],
            "ethical_flag": "False",
            "reasoning_trace": []
        }"#;
        assert!(matches!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::Schema(_))
        ));
    }

    #[test]
    fn test_missing_reasoning_trace_rejected() {
        let raw = r#"{"narrative": "n", "compliance_state": "AT_RISK", "citations": ["ESRS_E4.pdf"]}"#;
        assert!(matches!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::Schema(detail)) if detail.contains("reasoning_trace")
        ));
    }

    #[test]
    fn test_ethical_flag_not_part_of_schema() {
        let raw = r#"{
            "narrative": "n",
            "compliance_state": "AT_RISK",
            "citations": ["ESRS_E4.pdf"],
            "reasoning_trace": [],
            "ethical_flag": "True"
        }"#;
        assert!(matches!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::Schema(detail)) if detail.contains("ethical_flag")
        ));
    }

    #[test]
    fn test_unknown_state_rejected() {
        let raw = r#"{"narrative": "n", "compliance_state": "MAYBE", "citations": []}"#;
        assert!(matches!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::Schema(_))
        ));
    }

    #[test]
    fn test_citation_outside_evidence_rejected() {
        let raw = r#"{"narrative": "n", "compliance_state": "COMPLIANT", "citations": ["Taxonomy_Act.pdf"], "reasoning_trace": []}"#;
        assert_eq!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::UnknownCitation(
                "Taxonomy_Act.pdf".to_string()
            ))
        );
    }

    #[test]
    fn test_uncited_judgment_rejected() {
        let raw = r#"{"narrative": "n", "compliance_state": "NON_COMPLIANT", "citations": ["  "], "reasoning_trace": []}"#;
        assert_eq!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::UncitedJudgment(
                ComplianceState::NonCompliant
            ))
        );
    }

    #[test]
    fn test_uncited_no_evidence_accepted() {
        let raw = r#"{"narrative": "Evidence does not address hectares.", "compliance_state": "NO_EVIDENCE", "citations": [], "key_gap": "No restoration article retrieved", "reasoning_trace": ["Step 1: no hectare rule"]}"#;
        let verdict = validate_payload(raw, &sources()).unwrap();
        assert_eq!(verdict.compliance_state(), ComplianceState::NoEvidence);
        assert_eq!(verdict.basis(), VerdictBasis::Judged);
    }

    #[test]
    fn test_empty_narrative_rejected() {
        let raw = r#"{"narrative": "   ", "compliance_state": "NO_EVIDENCE", "citations": [], "reasoning_trace": []}"#;
        assert_eq!(
            validate_payload(raw, &sources()),
            Err(OracleValidationError::EmptyNarrative)
        );
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            validate_payload("COMPLIANT", &sources()),
            Err(OracleValidationError::NotJson(_))
        ));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: An accepted verdict never cites outside the allowed set
        #[test]
        fn accepted_citations_are_subset(
            cited in prop::collection::vec("[a-c]\\.pdf", 0..4),
            allowed in prop::collection::btree_set("[a-c]\\.pdf", 0..4),
        ) {
            let raw = serde_json::json!({
                "narrative": "n",
                "compliance_state": "AT_RISK",
                "citations": cited,
                "reasoning_trace": ["Step 1"],
            })
            .to_string();

            if let Ok(verdict) = validate_payload(&raw, &allowed) {
                prop_assert!(!verdict.citations().is_empty());
                prop_assert!(verdict.citations().is_subset(&allowed));
            }
        }

        /// Property: Arbitrary text never panics the validator
        #[test]
        fn arbitrary_input_never_panics(raw in ".*") {
            let _ = validate_payload(&raw, &BTreeSet::new());
        }
    }
}
