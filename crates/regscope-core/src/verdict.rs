use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clarification::ClarificationAudit;
use crate::finding::{JurisdictionFinding, clamp_confidence, clamp_risk};
use crate::session::{ReasoningLogEntry, SessionStatus};

/// The synthesized compliance decision for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub feature_id: String,
    pub feature_name: String,
    pub compliance_required: bool,
    pub risk_level: u8,
    pub applicable_jurisdictions: Vec<String>,
    pub requirements: Vec<String>,
    pub implementation_steps: Vec<String>,
    pub confidence_score: f64,
    pub reasoning: String,
    pub per_jurisdiction_details: Vec<JurisdictionFinding>,
    pub total_analysis_time_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub manual_review_recommended: bool,
    pub session_status: SessionStatus,
    #[serde(default)]
    pub reasoning_log: Vec<ReasoningLogEntry>,
    #[serde(default)]
    pub clarification_audit: Vec<ClarificationAudit>,
}

impl ComplianceVerdict {
    /// Re-apply the declared ranges for risk and confidence.
    pub fn clamped(mut self) -> Self {
        self.risk_level = clamp_risk(i64::from(self.risk_level));
        self.confidence_score = clamp_confidence(self.confidence_score);
        self
    }
}
