//! Human-in-the-loop clarification records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Option offered for "analyze everywhere" in geographic-scope questions.
pub const GLOBAL_OPTION: &str = "Global (all regions)";
/// Option offered when the answer is a set of regions still to be listed.
pub const MULTIPLE_REGIONS_OPTION: &str = "Multiple specific regions";

pub const RISK_OPTIONS: &[&str] = &["Low", "Medium", "High", "Critical"];

pub const CATEGORY_OPTIONS: &[&str] = &[
    "Content Moderation",
    "Data Processing",
    "Age Verification",
    "Recommendation System",
    "Location Services",
    "Advertising",
    "Payments",
    "General Feature",
];

pub const AMBIGUITY_OPTIONS: &[&str] = &[
    "Proceed with current scope",
    "Narrow the analysis",
    "Provide more details",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClarificationKind {
    GeographicScope,
    RiskAssessment,
    FeatureCategory,
    ComplianceAmbiguity,
}

impl ClarificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeographicScope => "geographic-scope",
            Self::RiskAssessment => "risk-assessment",
            Self::FeatureCategory => "feature-category",
            Self::ComplianceAmbiguity => "compliance-ambiguity",
        }
    }
}

impl fmt::Display for ClarificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question put to a human while the session is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: ClarificationKind,
    pub question: String,
    pub options: Vec<String>,
    /// Free-form context shown alongside the question.
    pub context: String,
    pub created_at: DateTime<Utc>,
}

impl ClarificationRequest {
    pub fn new(
        session_id: Uuid,
        kind: ClarificationKind,
        question: impl Into<String>,
        options: Vec<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            kind,
            question: question.into(),
            options,
            context: context.into(),
            created_at: Utc::now(),
        }
    }
}

/// Who produced an answer. Timeout answers are the injected default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Human,
    Timeout,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationResponse {
    pub request_id: Uuid,
    pub session_id: Uuid,
    pub answer_text: String,
    pub answered_at: DateTime<Utc>,
    pub source: AnswerSource,
}

impl ClarificationResponse {
    pub fn human(request: &ClarificationRequest, answer: impl Into<String>) -> Self {
        Self::build(request, answer.into(), AnswerSource::Human)
    }

    pub fn timeout(request: &ClarificationRequest, default_answer: impl Into<String>) -> Self {
        Self::build(request, default_answer.into(), AnswerSource::Timeout)
    }

    fn build(request: &ClarificationRequest, answer_text: String, source: AnswerSource) -> Self {
        Self {
            request_id: request.id,
            session_id: request.session_id,
            answer_text,
            answered_at: Utc::now(),
            source,
        }
    }
}

/// Audit trail entry pairing a question with the raw answer it received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationAudit {
    pub request_id: Uuid,
    pub kind: ClarificationKind,
    pub question: String,
    pub raw_answer: String,
    pub source: AnswerSource,
    /// What the answer was resolved to, or the follow-up it triggered.
    pub resolution: String,
    pub recorded_at: DateTime<Utc>,
}

impl ClarificationAudit {
    pub fn new(
        request: &ClarificationRequest,
        response: &ClarificationResponse,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request.id,
            kind: request.kind,
            question: request.question.clone(),
            raw_answer: response.answer_text.clone(),
            source: response.source,
            resolution: resolution.into(),
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ClarificationKind::GeographicScope).unwrap();
        assert_eq!(json, "\"geographic-scope\"");
        assert_eq!(ClarificationKind::RiskAssessment.to_string(), "risk-assessment");
    }

    #[test]
    fn timeout_response_is_marked() {
        let req = ClarificationRequest::new(
            Uuid::now_v7(),
            ClarificationKind::GeographicScope,
            "Where?",
            vec![GLOBAL_OPTION.into()],
            "",
        );
        let resp = ClarificationResponse::timeout(&req, "All Regions");
        assert_eq!(resp.source, AnswerSource::Timeout);
        assert_eq!(resp.request_id, req.id);
        assert_eq!(resp.session_id, req.session_id);
        assert_eq!(resp.answer_text, "All Regions");
    }

    #[test]
    fn audit_keeps_question_and_raw_answer() {
        let req = ClarificationRequest::new(
            Uuid::now_v7(),
            ClarificationKind::FeatureCategory,
            "Which category?",
            CATEGORY_OPTIONS.iter().map(|s| s.to_string()).collect(),
            "",
        );
        let resp = ClarificationResponse::human(&req, "payments stuff");
        let audit = ClarificationAudit::new(&req, &resp, "Payments");
        assert_eq!(audit.question, "Which category?");
        assert_eq!(audit.raw_answer, "payments stuff");
        assert_eq!(audit.source, AnswerSource::Human);
    }
}
