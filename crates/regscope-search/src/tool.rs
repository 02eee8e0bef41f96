//! Jurisdiction search tools and their result payloads.

use async_trait::async_trait;
use regscope_core::context::EnrichedContext;
use regscope_core::finding::{JurisdictionFinding, clamp_confidence, clamp_risk};
use regscope_core::tool::ToolDescriptor;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SearchError;

/// A knowledge-search service covering one jurisdiction.
#[async_trait]
pub trait JurisdictionTool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Analyze `context` against this jurisdiction's regulations.
    async fn invoke(
        &self,
        context: &EnrichedContext,
        focus: Option<&str>,
    ) -> Result<JurisdictionFinding, SearchError>;
}

/// Result of a registry tool call. Errors are "no finding", never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Finding(JurisdictionFinding),
    Error(String),
}

impl ToolOutcome {
    pub fn finding(&self) -> Option<&JurisdictionFinding> {
        match self {
            Self::Finding(f) => Some(f),
            Self::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Arguments sent to remote tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolArguments<'a> {
    pub feature_name: &'a str,
    pub feature_description: &'a str,
    pub geographic_implications: &'a [String],
    pub feature_category: &'a str,
    pub risk_indicators: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<&'a str>,
}

impl<'a> ToolArguments<'a> {
    pub fn new(context: &'a EnrichedContext, focus: Option<&'a str>) -> Self {
        Self {
            feature_name: &context.original_feature_name,
            feature_description: &context.expanded_description,
            geographic_implications: &context.geographic_implications,
            feature_category: &context.feature_category,
            risk_indicators: &context.risk_indicators,
            focus,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FindingPayload {
    #[serde(default)]
    jurisdiction: Option<String>,
    #[serde(
        default,
        alias = "applicableRegulations",
        alias = "regulations",
        deserialize_with = "lenient_list"
    )]
    applicable_regulations: Vec<String>,
    #[serde(default, alias = "complianceRequired", deserialize_with = "lenient_bool")]
    compliance_required: bool,
    #[serde(default, alias = "riskLevel", deserialize_with = "lenient_risk")]
    risk_level: Option<i64>,
    #[serde(default, deserialize_with = "lenient_list")]
    requirements: Vec<String>,
    #[serde(default, alias = "implementationSteps", deserialize_with = "lenient_list")]
    implementation_steps: Vec<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "required"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Numeric levels, numeric strings, or `low`..`critical`.
fn lenient_risk<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            match s.as_str() {
                "minimal" | "none" => Some(1),
                "low" => Some(2),
                "medium" | "moderate" => Some(3),
                "high" => Some(4),
                "critical" | "severe" => Some(5),
                _ => s.parse().ok(),
            }
        }
        _ => None,
    })
}

/// Convert a tool payload into a finding.
///
/// String payloads are parsed as JSON and `{"result": …}` wrappers are
/// unwrapped. `{"error": …}` becomes [`SearchError::ToolFailed`]. A missing
/// jurisdiction falls back to `tool`'s own.
pub fn parse_finding(payload: Value, tool: &ToolDescriptor) -> Result<JurisdictionFinding, SearchError> {
    let payload = match payload {
        Value::String(text) => serde_json::from_str(text.trim())
            .map_err(|e| SearchError::Payload(format!("{}: {e}", tool.name)))?,
        other => other,
    };
    let payload = match payload {
        Value::Object(mut map) if map.contains_key("result") && !map.contains_key("jurisdiction") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    };
    if !payload.is_object() {
        return Err(SearchError::Payload(format!(
            "{}: expected a JSON object",
            tool.name
        )));
    }
    if let Some(err) = payload.get("error").filter(|e| !e.is_null()) {
        let message = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(SearchError::ToolFailed {
            tool: tool.name.clone(),
            message,
        });
    }

    let raw: FindingPayload = serde_json::from_value(payload)?;
    let jurisdiction = raw
        .jurisdiction
        .map(|j| j.trim().to_string())
        .filter(|j| !j.is_empty())
        .unwrap_or_else(|| tool.jurisdiction.clone());
    Ok(JurisdictionFinding {
        jurisdiction,
        applicable_regulations: raw.applicable_regulations,
        compliance_required: raw.compliance_required,
        risk_level: clamp_risk(raw.risk_level.unwrap_or(1)),
        requirements: raw.requirements,
        implementation_steps: raw.implementation_steps,
        confidence: clamp_confidence(raw.confidence.unwrap_or(0.0)),
        reasoning: raw.reasoning.unwrap_or_default(),
        analysis_duration_seconds: 0.0,
    }
    .normalized())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utah() -> ToolDescriptor {
        ToolDescriptor::new("utah_search", "Utah")
    }

    #[test]
    fn parses_snake_case_payload() {
        let f = parse_finding(
            json!({
                "jurisdiction": "Utah",
                "applicable_regulations": ["Utah Social Media Regulation Act"],
                "compliance_required": true,
                "risk_level": 4,
                "requirements": ["Curfew for minors", "Curfew for minors"],
                "implementation_steps": ["Add curfew check"],
                "confidence": 0.85,
                "reasoning": "Minors in Utah"
            }),
            &utah(),
        )
        .unwrap();
        assert!(f.compliance_required);
        assert_eq!(f.risk_level, 4);
        assert_eq!(f.requirements, vec!["Curfew for minors"]);
        assert_eq!(f.confidence, 0.85);
    }

    #[test]
    fn accepts_camel_case_and_clamps() {
        let f = parse_finding(
            json!({
                "complianceRequired": "yes",
                "riskLevel": 11,
                "implementationSteps": "Add age gate",
                "confidence": 3.2
            }),
            &utah(),
        )
        .unwrap();
        assert_eq!(f.jurisdiction, "Utah");
        assert!(f.compliance_required);
        assert_eq!(f.risk_level, 5);
        assert_eq!(f.implementation_steps, vec!["Add age gate"]);
        assert_eq!(f.confidence, 1.0);
    }

    #[test]
    fn word_risk_levels() {
        let f = parse_finding(json!({"risk_level": "High"}), &utah()).unwrap();
        assert_eq!(f.risk_level, 4);
        let f = parse_finding(json!({"risk_level": 0}), &utah()).unwrap();
        assert_eq!(f.risk_level, 1);
    }

    #[test]
    fn error_payload_is_tool_failure() {
        let err = parse_finding(json!({"error": "index offline"}), &utah()).unwrap_err();
        match err {
            SearchError::ToolFailed { tool, message } => {
                assert_eq!(tool, "utah_search");
                assert_eq!(message, "index offline");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn string_and_wrapped_payloads() {
        let f = parse_finding(
            Value::String(r#"{"result": {"compliance_required": false, "risk_level": 2}}"#.into()),
            &utah(),
        )
        .unwrap();
        assert!(!f.compliance_required);
        assert_eq!(f.risk_level, 2);
    }

    #[test]
    fn non_object_payload_rejected() {
        assert!(matches!(
            parse_finding(json!([1, 2]), &utah()),
            Err(SearchError::Payload(_))
        ));
        assert!(matches!(
            parse_finding(Value::String("not json".into()), &utah()),
            Err(SearchError::Payload(_))
        ));
    }

    #[test]
    fn arguments_serialize_context_fields() {
        let ctx = EnrichedContext {
            original_feature_name: "Curfew".into(),
            expanded_description: "Curfew for minors".into(),
            geographic_implications: vec!["Utah".into()],
            feature_category: "Age Verification".into(),
            risk_indicators: vec!["minors".into()],
            ..Default::default()
        };
        let args = serde_json::to_value(ToolArguments::new(&ctx, Some("curfew"))).unwrap();
        assert_eq!(args["feature_name"], "Curfew");
        assert_eq!(args["geographic_implications"], json!(["Utah"]));
        assert_eq!(args["focus"], "curfew");
        let args = serde_json::to_value(ToolArguments::new(&ctx, None)).unwrap();
        assert!(args.get("focus").is_none());
    }
}
