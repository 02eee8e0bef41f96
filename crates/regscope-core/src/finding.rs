//! Per-jurisdiction analysis results.

use serde::{Deserialize, Serialize};

use crate::ordered::dedup_preserving_order;

pub const MIN_RISK_LEVEL: u8 = 1;
pub const MAX_RISK_LEVEL: u8 = 5;

/// The outcome of analyzing a feature against one jurisdiction's regulations.
///
/// Produced by a jurisdiction search tool and appended to the session; never
/// mutated afterwards. Construct through [`JurisdictionFinding::normalized`]
/// so ranges and ordered sets hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JurisdictionFinding {
    pub jurisdiction: String,
    pub applicable_regulations: Vec<String>,
    pub compliance_required: bool,
    /// 1 (minimal) to 5 (critical).
    pub risk_level: u8,
    pub requirements: Vec<String>,
    pub implementation_steps: Vec<String>,
    /// 0.0 to 1.0. Zero means the tool did not report a confidence.
    pub confidence: f64,
    pub reasoning: String,
    pub analysis_duration_seconds: f64,
}

impl JurisdictionFinding {
    /// A non-compliant, minimal-risk finding with no detail.
    pub fn empty(jurisdiction: impl Into<String>) -> Self {
        Self {
            jurisdiction: jurisdiction.into(),
            applicable_regulations: Vec::new(),
            compliance_required: false,
            risk_level: MIN_RISK_LEVEL,
            requirements: Vec::new(),
            implementation_steps: Vec::new(),
            confidence: 0.0,
            reasoning: String::new(),
            analysis_duration_seconds: 0.0,
        }
    }

    /// Clamp numeric fields and deduplicate list fields.
    pub fn normalized(mut self) -> Self {
        self.risk_level = clamp_risk(i64::from(self.risk_level));
        self.confidence = clamp_confidence(self.confidence);
        self.applicable_regulations = dedup_preserving_order(&self.applicable_regulations);
        self.requirements = dedup_preserving_order(&self.requirements);
        self.implementation_steps = dedup_preserving_order(&self.implementation_steps);
        if !self.analysis_duration_seconds.is_finite() || self.analysis_duration_seconds < 0.0 {
            self.analysis_duration_seconds = 0.0;
        }
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.analysis_duration_seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self
    }
}

/// Clamp a raw risk value into `[1, 5]`.
pub fn clamp_risk(raw: i64) -> u8 {
    raw.clamp(i64::from(MIN_RISK_LEVEL), i64::from(MAX_RISK_LEVEL)) as u8
}

/// Clamp a raw confidence into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_clamps_ranges() {
        let mut f = JurisdictionFinding::empty("Utah");
        f.risk_level = 9;
        f.confidence = 1.7;
        let f = f.normalized();
        assert_eq!(f.risk_level, 5);
        assert_eq!(f.confidence, 1.0);
    }

    #[test]
    fn zero_risk_clamps_to_one() {
        let mut f = JurisdictionFinding::empty("Utah");
        f.risk_level = 0;
        assert_eq!(f.normalized().risk_level, 1);
    }

    #[test]
    fn nan_confidence_becomes_zero() {
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
    }

    #[test]
    fn normalized_dedups_lists() {
        let mut f = JurisdictionFinding::empty("EU");
        f.requirements = vec!["a".into(), "b".into(), "a".into()];
        assert_eq!(f.normalized().requirements, vec!["a", "b"]);
    }

    #[test]
    fn clamp_risk_bounds() {
        assert_eq!(clamp_risk(-3), 1);
        assert_eq!(clamp_risk(3), 3);
        assert_eq!(clamp_risk(42), 5);
    }
}
