//! Verdict synthesis.
//!
//! With findings, the verdict is a pure aggregation. Without findings, one
//! holistic oracle assessment of the enriched context is attempted, falling
//! back to a conservative deterministic verdict.

use std::sync::Arc;

use chrono::Utc;
use regscope_ai::json::{bool_field, number_field, parse_json_object, snippet, string_field, string_list};
use regscope_ai::oracle::{CompletionRequest, Oracle, OracleError};
use regscope_core::config::SynthesisConfig;
use regscope_core::context::EnrichedContext;
use regscope_core::finding::{JurisdictionFinding, clamp_confidence, clamp_risk};
use regscope_core::ordered::{dedup_preserving_order, push_unique};
use regscope_core::session::AnalysisSession;
use regscope_core::verdict::ComplianceVerdict;
use tracing::{debug, info, warn};

/// Confidence when no finding reports one.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;
/// Confidence of the deterministic no-findings fallback.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Confidence of a verdict produced after an internal failure.
pub const ERROR_CONFIDENCE: f64 = 0.1;
/// Verdicts below this confidence recommend manual review.
pub const MANUAL_REVIEW_THRESHOLD: f64 = 0.5;

pub const MANUAL_REVIEW_SENTENCE: &str = "Manual legal review recommended.";

/// Jurisdictions whose compliance triggers get a named call-out.
const CALL_OUTS: &[(&str, &str)] = &[
    (
        "Utah",
        "Utah: the Utah Social Media Regulation Act imposes minor protections such as curfews, parental consent and age verification.",
    ),
    (
        "Florida",
        "Florida: the Florida Online Protections for Minors law restricts accounts and features for minors.",
    ),
    (
        "California",
        "California: the California Consumer Privacy Act and SB976 govern personal data and addictive feeds for minors.",
    ),
    (
        "European Union",
        "European Union: the Digital Services Act sets transparency, moderation and minor-protection duties.",
    ),
    (
        "United States",
        "United States: federal NCMEC reporting obligations apply to child sexual abuse material.",
    ),
];

const HOLISTIC_PROMPT: &str = "\
You are a compliance analyst. No jurisdiction-specific research was available for this \
feature, so assess it holistically from its description and signals.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"compliance_required\": true,
  \"risk_level\": 1,
  \"applicable_jurisdictions\": [\"jurisdiction names\"],
  \"requirements\": [\"concrete legal requirements\"],
  \"implementation_steps\": [\"engineering steps\"],
  \"confidence\": 0.0,
  \"reasoning\": \"two or three sentences\"
}

risk_level is an integer from 1 (minimal) to 5 (critical). confidence is between 0 and 1.";

/// Fields of a verdict derived from findings alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub compliance_required: bool,
    pub risk_level: u8,
    pub applicable_jurisdictions: Vec<String>,
    pub requirements: Vec<String>,
    pub implementation_steps: Vec<String>,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// Combine findings with the fixed aggregation rules. O(n) in findings.
pub fn aggregate(findings: &[JurisdictionFinding]) -> Aggregate {
    let compliant: Vec<&JurisdictionFinding> =
        findings.iter().filter(|f| f.compliance_required).collect();

    let risk_level = findings
        .iter()
        .map(|f| f.risk_level)
        .filter(|r| *r > 0)
        .max()
        .map_or(1, |r| clamp_risk(i64::from(r)));

    let mut applicable_jurisdictions = Vec::new();
    let mut requirements = Vec::new();
    let mut implementation_steps = Vec::new();
    for f in &compliant {
        push_unique(&mut applicable_jurisdictions, &f.jurisdiction);
        requirements.extend(f.requirements.iter().cloned());
        implementation_steps.extend(f.implementation_steps.iter().cloned());
    }

    let reported: Vec<f64> = findings
        .iter()
        .map(|f| f.confidence)
        .filter(|c| *c > 0.0)
        .collect();
    let confidence_score = if reported.is_empty() {
        NEUTRAL_CONFIDENCE
    } else {
        clamp_confidence(reported.iter().sum::<f64>() / reported.len() as f64)
    };

    let reasoning = reasoning_for(findings.len(), &applicable_jurisdictions, risk_level);

    Aggregate {
        compliance_required: !compliant.is_empty(),
        risk_level,
        applicable_jurisdictions,
        requirements: dedup_preserving_order(&requirements),
        implementation_steps: dedup_preserving_order(&implementation_steps),
        confidence_score,
        reasoning,
    }
}

fn reasoning_for(analyzed: usize, compliant: &[String], risk_level: u8) -> String {
    let mut parts = Vec::new();
    if compliant.is_empty() {
        parts.push(format!(
            "No jurisdiction-specific compliance requirements identified across {analyzed} analyzed jurisdiction(s)."
        ));
    } else {
        parts.push(format!(
            "Compliance required in {} jurisdiction(s): {}.",
            compliant.len(),
            compliant.join(", ")
        ));
    }
    if risk_level >= 4 {
        parts.push(format!(
            "High risk level ({risk_level}/5) indicates significant regulatory exposure, particularly around minors' protection and personal data handling."
        ));
    } else if risk_level >= 3 {
        parts.push(format!(
            "Moderate risk level ({risk_level}/5) warrants careful implementation review."
        ));
    }
    for (jurisdiction, call_out) in CALL_OUTS {
        if compliant.iter().any(|j| j == jurisdiction) {
            parts.push((*call_out).to_string());
        }
    }
    parts.join(" ")
}

fn verdict_from(session: &AnalysisSession, agg: Aggregate, manual_review: bool) -> ComplianceVerdict {
    ComplianceVerdict {
        feature_id: session.feature_id.clone(),
        feature_name: session.enriched_context.original_feature_name.clone(),
        compliance_required: agg.compliance_required,
        risk_level: agg.risk_level,
        applicable_jurisdictions: agg.applicable_jurisdictions,
        requirements: agg.requirements,
        implementation_steps: agg.implementation_steps,
        confidence_score: agg.confidence_score,
        reasoning: agg.reasoning,
        per_jurisdiction_details: session.collected_findings.clone(),
        total_analysis_time_seconds: session.elapsed_seconds(),
        created_at: Utc::now(),
        manual_review_recommended: manual_review || agg.confidence_score < MANUAL_REVIEW_THRESHOLD,
        session_status: session.status(),
        reasoning_log: session.reasoning_log.clone(),
        clarification_audit: session.clarification_audit.clone(),
    }
    .clamped()
}

/// Best-effort verdict for a session that failed internally.
///
/// Findings gathered before the failure still drive the compliance fields;
/// confidence is pinned low and manual review is always recommended.
pub fn error_verdict(session: &AnalysisSession, message: &str) -> ComplianceVerdict {
    let mut agg = aggregate(&session.collected_findings);
    agg.confidence_score = ERROR_CONFIDENCE;
    agg.reasoning = format!("Analysis failed: {message}. {MANUAL_REVIEW_SENTENCE}");
    verdict_from(session, agg, true)
}

/// Deterministic verdict used when no findings and no usable oracle exist.
pub fn conservative_aggregate(ctx: &EnrichedContext) -> Aggregate {
    let flagged = !ctx.risk_indicators.is_empty();
    let reasoning = if flagged {
        format!(
            "No jurisdiction research was available. Risk indicators ({}) suggest compliance obligations. {MANUAL_REVIEW_SENTENCE}",
            ctx.risk_indicators.join(", ")
        )
    } else {
        format!(
            "No jurisdiction research was available and no risk indicators were identified. {MANUAL_REVIEW_SENTENCE}"
        )
    };
    Aggregate {
        compliance_required: flagged,
        risk_level: if flagged { 3 } else { 1 },
        applicable_jurisdictions: ctx.geographic_implications.clone(),
        requirements: Vec::new(),
        implementation_steps: Vec::new(),
        confidence_score: FALLBACK_CONFIDENCE,
        reasoning,
    }
}

pub struct Synthesizer {
    oracle: Option<Arc<dyn Oracle>>,
    config: SynthesisConfig,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            oracle: None,
            config,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Build the verdict for a finished session. Never fails.
    pub async fn synthesize(&self, session: &AnalysisSession) -> ComplianceVerdict {
        if !session.collected_findings.is_empty() {
            let agg = aggregate(&session.collected_findings);
            info!(
                session_id = %session.session_id,
                findings = session.collected_findings.len(),
                compliance_required = agg.compliance_required,
                risk_level = agg.risk_level,
                "verdict aggregated"
            );
            return verdict_from(session, agg, false);
        }

        match self.holistic(&session.enriched_context).await {
            Ok(agg) => {
                info!(session_id = %session.session_id, risk_level = agg.risk_level, "holistic verdict");
                verdict_from(session, agg, false)
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "holistic assessment unavailable; using conservative verdict");
                verdict_from(session, conservative_aggregate(&session.enriched_context), true)
            }
        }
    }

    async fn holistic(&self, ctx: &EnrichedContext) -> Result<Aggregate, OracleError> {
        let Some(oracle) = &self.oracle else {
            return Err(OracleError::Transport("no oracle configured".into()));
        };
        let prompt = ctx.summary();
        debug!(prompt = %prompt, "holistic prompt");
        let request = CompletionRequest::new(prompt)
            .with_system(HOLISTIC_PROMPT)
            .with_limits(self.config.max_tokens, self.config.temperature);
        let completion = oracle.complete(&request).await?;
        let value = parse_json_object(&completion.content).ok_or_else(|| {
            OracleError::Malformed(format!(
                "no JSON object in holistic reply: {}",
                snippet(&completion.content, 200)
            ))
        })?;

        let compliance_required =
            bool_field(&value, "compliance_required").unwrap_or(!ctx.risk_indicators.is_empty());
        let risk_level = number_field(&value, "risk_level").map_or(1, |r| clamp_risk(r.round() as i64));
        let confidence_score = number_field(&value, "confidence")
            .map_or(NEUTRAL_CONFIDENCE, clamp_confidence);
        let mut applicable_jurisdictions = string_list(&value, "applicable_jurisdictions");
        if applicable_jurisdictions.is_empty() && compliance_required {
            applicable_jurisdictions = ctx.geographic_implications.clone();
        }
        Ok(Aggregate {
            compliance_required,
            risk_level,
            applicable_jurisdictions: dedup_preserving_order(&applicable_jurisdictions),
            requirements: dedup_preserving_order(&string_list(&value, "requirements")),
            implementation_steps: dedup_preserving_order(&string_list(&value, "implementation_steps")),
            confidence_score,
            reasoning: string_field(&value, "reasoning")
                .unwrap_or_else(|| "Holistic assessment without jurisdiction-specific research.".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use regscope_ai::oracle::Completion;
    use regscope_core::session::SessionStatus;

    fn finding(j: &str, compliant: bool, risk: u8, confidence: f64) -> JurisdictionFinding {
        let mut f = JurisdictionFinding::empty(j);
        f.compliance_required = compliant;
        f.risk_level = risk;
        f.confidence = confidence;
        f
    }

    struct FixedOracle(Result<String, ()>);

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, OracleError> {
            match &self.0 {
                Ok(content) => Ok(Completion {
                    content: content.clone(),
                    tokens_used: 10,
                }),
                Err(()) => Err(OracleError::Transport("connection refused".into())),
            }
        }
    }

    #[test]
    fn highest_risk_and_compliant_jurisdictions() {
        let agg = aggregate(&[
            finding("European Union", false, 2, 0.0),
            finding("Utah", true, 4, 0.0),
            finding("Florida", false, 1, 0.0),
        ]);
        assert!(agg.compliance_required);
        assert_eq!(agg.risk_level, 4);
        assert_eq!(agg.applicable_jurisdictions, vec!["Utah"]);
        assert_eq!(agg.confidence_score, 0.5);
        assert!(agg.reasoning.starts_with("Compliance required in 1 jurisdiction(s): Utah."));
        assert!(agg.reasoning.contains("High risk level (4/5)"));
        assert!(agg.reasoning.contains("Utah Social Media Regulation Act"));
        assert!(!agg.reasoning.contains("Digital Services Act"));
    }

    #[test]
    fn no_compliant_findings() {
        let agg = aggregate(&[finding("Brazil", false, 3, 0.8), finding("Japan", false, 1, 0.4)]);
        assert!(!agg.compliance_required);
        assert!(agg.applicable_jurisdictions.is_empty());
        assert!(agg.reasoning.starts_with(
            "No jurisdiction-specific compliance requirements identified across 2 analyzed jurisdiction(s)."
        ));
        assert!(agg.reasoning.contains("Moderate risk level (3/5)"));
        assert!((agg.confidence_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn requirements_from_compliant_findings_only() {
        let mut eu = finding("European Union", true, 3, 0.9);
        eu.requirements = vec!["Transparency report".into(), "Age assurance".into()];
        eu.implementation_steps = vec!["Add report export".into()];
        let mut ut = finding("Utah", true, 4, 0.7);
        ut.requirements = vec!["Age assurance".into(), "Curfew".into()];
        let mut br = finding("Brazil", false, 2, 0.5);
        br.requirements = vec!["LGPD notice".into()];
        let agg = aggregate(&[eu, ut, br]);
        assert_eq!(agg.requirements, vec!["Transparency report", "Age assurance", "Curfew"]);
        assert_eq!(agg.implementation_steps, vec!["Add report export"]);
        assert_eq!(agg.applicable_jurisdictions, vec!["European Union", "Utah"]);
    }

    #[test]
    fn empty_findings_defaults() {
        let agg = aggregate(&[]);
        assert!(!agg.compliance_required);
        assert_eq!(agg.risk_level, 1);
        assert_eq!(agg.confidence_score, 0.5);
    }

    #[test]
    fn error_verdict_is_low_confidence() {
        let mut session = AnalysisSession::new("feat-9", EnrichedContext::default());
        session.record_finding(finding("Utah", true, 5, 0.9));
        session.fail("invalid transition").unwrap();
        let v = error_verdict(&session, "invalid transition");
        assert_eq!(v.confidence_score, 0.1);
        assert!(v.manual_review_recommended);
        assert!(v.reasoning.contains("invalid transition"));
        assert!(v.reasoning.ends_with("Manual legal review recommended."));
        assert_eq!(v.session_status, SessionStatus::Error);
        assert_eq!(v.per_jurisdiction_details.len(), 1);
        assert!(v.compliance_required);
    }

    fn session_with_risks(risks: &[&str]) -> AnalysisSession {
        let mut ctx = EnrichedContext::default();
        ctx.original_feature_name = "Feed".into();
        ctx.geographic_implications = vec!["Utah".into()];
        for r in risks {
            ctx.add_risk_indicator(r);
        }
        AnalysisSession::new("feat-1", ctx)
    }

    #[tokio::test]
    async fn holistic_assessment_parses_oracle_json() {
        let reply = r#"Here you go:
```json
{"compliance_required": true, "risk_level": 4, "applicable_jurisdictions": ["Utah"],
 "requirements": ["Parental consent"], "implementation_steps": [], "confidence": 0.7,
 "reasoning": "Minors in Utah."}
```"#;
        let synth = Synthesizer::new(SynthesisConfig::default())
            .with_oracle(Arc::new(FixedOracle(Ok(reply.into()))));
        let v = synth.synthesize(&session_with_risks(&["minors"])).await;
        assert!(v.compliance_required);
        assert_eq!(v.risk_level, 4);
        assert_eq!(v.applicable_jurisdictions, vec!["Utah"]);
        assert_eq!(v.confidence_score, 0.7);
        assert!(!v.manual_review_recommended);
        assert_eq!(v.reasoning, "Minors in Utah.");
    }

    #[tokio::test]
    async fn failing_oracle_gives_conservative_verdict() {
        let synth = Synthesizer::new(SynthesisConfig::default())
            .with_oracle(Arc::new(FixedOracle(Err(()))));
        let v = synth.synthesize(&session_with_risks(&["minors"])).await;
        assert!(v.compliance_required);
        assert_eq!(v.risk_level, 3);
        assert_eq!(v.confidence_score, 0.3);
        assert!(v.manual_review_recommended);
        assert_eq!(v.applicable_jurisdictions, vec!["Utah"]);

        let v = Synthesizer::new(SynthesisConfig::default())
            .synthesize(&session_with_risks(&[]))
            .await;
        assert!(!v.compliance_required);
        assert_eq!(v.risk_level, 1);
    }

    #[tokio::test]
    async fn unparseable_holistic_reply_falls_back() {
        let synth = Synthesizer::new(SynthesisConfig::default())
            .with_oracle(Arc::new(FixedOracle(Ok("I cannot say.".into()))));
        let v = synth.synthesize(&session_with_risks(&[])).await;
        assert_eq!(v.confidence_score, 0.3);
        assert!(v.manual_review_recommended);
    }

    fn arb_finding() -> impl Strategy<Value = JurisdictionFinding> {
        (
            prop::sample::select(vec!["Utah", "Florida", "European Union", "Brazil", "Ontario"]),
            any::<bool>(),
            0u8..=9,
            prop_oneof![Just(0.0), 0.0f64..=1.0],
            prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "d"]), 0..4),
        )
            .prop_map(|(j, compliant, risk, confidence, reqs)| {
                let mut f = finding(j, compliant, risk, confidence);
                f.requirements = reqs.into_iter().map(String::from).collect();
                f.normalized()
            })
    }

    proptest! {
        #[test]
        fn verdict_ranges_hold(findings in prop::collection::vec(arb_finding(), 0..8)) {
            let agg = aggregate(&findings);
            prop_assert!((1..=5).contains(&agg.risk_level));
            prop_assert!((0.0..=1.0).contains(&agg.confidence_score));
        }

        #[test]
        fn compliance_iff_any_compliant(findings in prop::collection::vec(arb_finding(), 0..8)) {
            let agg = aggregate(&findings);
            prop_assert_eq!(agg.compliance_required, findings.iter().any(|f| f.compliance_required));
        }

        #[test]
        fn compliance_and_risk_are_order_independent(
            findings in prop::collection::vec(arb_finding(), 1..8),
            shift in 0usize..8,
        ) {
            let mut rotated = findings.clone();
            let len = rotated.len();
            rotated.rotate_left(shift % len);
            let mut reversed = findings.clone();
            reversed.reverse();
            let base = aggregate(&findings);
            for other in [aggregate(&rotated), aggregate(&reversed)] {
                prop_assert_eq!(base.compliance_required, other.compliance_required);
                prop_assert_eq!(base.risk_level, other.risk_level);
            }
        }

        #[test]
        fn requirements_keep_first_occurrence(findings in prop::collection::vec(arb_finding(), 0..8)) {
            let agg = aggregate(&findings);
            let mut expected: Vec<String> = Vec::new();
            for f in findings.iter().filter(|f| f.compliance_required) {
                for r in &f.requirements {
                    if !expected.contains(r) {
                        expected.push(r.clone());
                    }
                }
            }
            prop_assert_eq!(agg.requirements, expected);
        }
    }
}
