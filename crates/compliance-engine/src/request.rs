//! Structured request sent to the reasoning oracle

use std::collections::BTreeSet;
use std::fmt::Write as _;

use shared_types::{DataPoint, EvidenceRef};

const SCHEMA_INSTRUCTION: &str = r#"Respond with a single JSON object containing exactly these fields and nothing else:
{
  "narrative": "one paragraph stating whether the reported data point complies with the regulation and why",
  "compliance_state": "COMPLIANT | AT_RISK | NON_COMPLIANT | NO_EVIDENCE",
  "citations": ["source identifiers copied exactly from the evidence headers"],
  "key_gap": "the most important missing information, or null",
  "reasoning_trace": ["Step 1: ...", "Step 2: ...", "Step 3: ..."]
}
Rules:
- Use only the numbered regulatory evidence supplied by the user.
- Cite only sources that appear in an evidence header.
- Any compliance_state other than NO_EVIDENCE must cite at least one source.
- Use NO_EVIDENCE when the evidence does not address the data point."#;

/// Prompt pair plus the set of sources the answer may cite
#[derive(Debug, Clone, PartialEq)]
pub struct DeliberationRequest {
    system: String,
    user: String,
    sources: BTreeSet<String>,
}

impl DeliberationRequest {
    /// Build a request embedding the data point verbatim and every evidence
    /// item with its source, page and score
    pub fn build(
        data_point: &DataPoint,
        evidence: &[EvidenceRef],
        analyst_role: &str,
    ) -> Result<Self, serde_json::Error> {
        let system = format!(
            "You are an expert analyst performing {} of corporate sustainability \
             disclosures against regulatory texts.\n\n{}",
            analyst_role, SCHEMA_INSTRUCTION
        );

        let mut user = String::new();
        let _ = writeln!(user, "REPORTED DATA POINT:");
        let _ = writeln!(user, "{}", serde_json::to_string_pretty(data_point)?);
        let _ = writeln!(user);
        let _ = writeln!(user, "REGULATORY EVIDENCE:");
        for (i, item) in evidence.iter().enumerate() {
            let _ = writeln!(
                user,
                "[{}] source={} page={} score={:.3}",
                i + 1,
                item.source,
                item.page,
                item.score
            );
            let _ = writeln!(user, "{}", item.excerpt);
            let _ = writeln!(user);
        }

        let sources = evidence.iter().map(|e| e.source.clone()).collect();

        Ok(Self {
            system,
            user,
            sources,
        })
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    pub fn user_prompt(&self) -> &str {
        &self.user
    }

    /// Source identifiers a valid answer may cite
    pub fn allowed_sources(&self) -> &BTreeSet<String> {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{DataValue, RiskLevel};

    fn point() -> DataPoint {
        DataPoint {
            id: "E4-5".to_string(),
            value: DataValue::Number(50.0),
            unit: Some("hectares".to_string()),
            project: "Amazonia Reforest".to_string(),
            risk_level: Some(RiskLevel::High),
            methodology: None,
        }
    }

    fn evidence() -> Vec<EvidenceRef> {
        vec![
            EvidenceRef {
                source: "EU_2024_1991.pdf".to_string(),
                page: 12,
                score: 0.8123,
                excerpt: "Restoration measures shall ensure permanence.".to_string(),
            },
            EvidenceRef {
                source: "ESRS_E4.pdf".to_string(),
                page: 3,
                score: 0.71,
                excerpt: "Disclosure requirement E4-5.".to_string(),
            },
        ]
    }

    #[test]
    fn test_evidence_attribution_in_prompt() {
        let request = DeliberationRequest::build(&point(), &evidence(), "Academic Validation")
            .unwrap();

        assert!(request
            .user_prompt()
            .contains("[1] source=EU_2024_1991.pdf page=12 score=0.812"));
        assert!(request
            .user_prompt()
            .contains("[2] source=ESRS_E4.pdf page=3 score=0.710"));
        assert!(request.system_prompt().contains("Academic Validation"));
        assert!(request.system_prompt().contains("compliance_state"));
    }

    #[test]
    fn test_data_point_embedded_verbatim() {
        let request = DeliberationRequest::build(&point(), &evidence(), "Audit").unwrap();
        let expected = serde_json::to_string_pretty(&point()).unwrap();
        assert!(request.user_prompt().contains(&expected));
    }

    #[test]
    fn test_allowed_sources() {
        let request = DeliberationRequest::build(&point(), &evidence(), "Audit").unwrap();
        let sources: Vec<&str> = request.allowed_sources().iter().map(String::as_str).collect();
        assert_eq!(sources, vec!["ESRS_E4.pdf", "EU_2024_1991.pdf"]);
    }
}
