pub mod clarification;
pub mod config;
pub mod context;
pub mod error;
pub mod finding;
pub mod glossary;
pub mod jurisdiction;
pub mod ordered;
pub mod session;
pub mod tool;
pub mod verdict;

pub use clarification::{
    AnswerSource, ClarificationAudit, ClarificationKind, ClarificationRequest,
    ClarificationResponse,
};
pub use config::RegscopeConfig;
pub use context::{EnrichedContext, FeatureInput};
pub use error::{ConfigError, SessionError};
pub use finding::{JurisdictionFinding, clamp_confidence, clamp_risk};
pub use glossary::Glossary;
pub use jurisdiction::{JurisdictionVocabulary, is_generic_region};
pub use session::{
    AnalysisSession, DecisionSource, MAX_ENRICHMENT_RETRIES, MAX_REASONING_ITERATIONS,
    ReasoningLogEntry, ResumePoint, SessionStatus,
};
pub use tool::ToolDescriptor;
pub use verdict::ComplianceVerdict;
