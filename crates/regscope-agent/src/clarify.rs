//! Clarification protocol: ambiguity detection, question construction, and
//! answer interpretation.
//!
//! Answers to geographic questions go through three tiers:
//!
//! 1. global intent: the answer is only a global phrase, or the oracle says
//!    yes when one is configured,
//! 2. "multiple regions" without names, which asks a follow-up for the list,
//! 3. matching against the jurisdiction vocabulary; no match asks a
//!    disambiguation follow-up quoting the answer.
//!
//! Named jurisdictions always win over global wording, so "Utah only, not
//! global" scopes to Utah. Timeout answers never trigger follow-ups, and a
//! timed-out question of any other kind leaves the context unchanged.

use std::fmt;
use std::sync::Arc;

use regscope_ai::oracle::{CompletionRequest, Oracle};
use regscope_core::clarification::{
    AMBIGUITY_OPTIONS, AnswerSource, CATEGORY_OPTIONS, ClarificationKind, ClarificationRequest,
    ClarificationResponse, GLOBAL_OPTION, MULTIPLE_REGIONS_OPTION, RISK_OPTIONS,
};
use regscope_core::context::EnrichedContext;
use regscope_core::jurisdiction::{JurisdictionVocabulary, is_generic_region};
use regscope_core::ordered::push_unique;
use tracing::{debug, warn};
use uuid::Uuid;

const GLOBAL_PHRASES: &[&str] = &[
    "global",
    "globally",
    "all regions",
    "all",
    "all markets",
    "all countries",
    "worldwide",
    "everywhere",
    "international",
];

const GLOBAL_INTENT_PROMPT: &str = "\
A user was asked which regions a product feature will launch in. Decide whether their \
answer means the feature applies globally (every region). Reply with YES or NO only.";

/// Why a context needs a geographic clarification before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbiguityReason {
    NoGeography,
    GenericGeography(String),
    ShortDescription { chars: usize, min: usize },
    UnknownRegions(Vec<String>),
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoGeography => write!(f, "no geographic scope was identified"),
            Self::GenericGeography(region) => {
                write!(f, "the geographic scope is only \"{region}\"")
            }
            Self::ShortDescription { chars, min } => write!(
                f,
                "the description is only {chars} characters (at least {min} expected)"
            ),
            Self::UnknownRegions(regions) => write!(
                f,
                "none of the stated regions ({}) match a known jurisdiction",
                regions.join(", ")
            ),
        }
    }
}

/// Pre-analysis ambiguity check. `None` means analysis can start directly.
pub fn detect_ambiguity(
    ctx: &EnrichedContext,
    vocabulary: &JurisdictionVocabulary,
    min_description_chars: usize,
) -> Option<AmbiguityReason> {
    let regions = &ctx.geographic_implications;
    if regions.is_empty() {
        return Some(AmbiguityReason::NoGeography);
    }
    if regions.len() == 1 && is_generic_region(&regions[0]) {
        return Some(AmbiguityReason::GenericGeography(regions[0].clone()));
    }
    let chars = ctx.original_description.chars().count();
    if chars < min_description_chars {
        return Some(AmbiguityReason::ShortDescription {
            chars,
            min: min_description_chars,
        });
    }
    let specific: Vec<&String> = regions.iter().filter(|r| !is_generic_region(r)).collect();
    if !specific.iter().any(|r| vocabulary.is_known(r)) {
        return Some(AmbiguityReason::UnknownRegions(regions.clone()));
    }
    None
}

pub fn is_ambiguous(
    ctx: &EnrichedContext,
    vocabulary: &JurisdictionVocabulary,
    min_description_chars: usize,
) -> bool {
    detect_ambiguity(ctx, vocabulary, min_description_chars).is_some()
}

fn owned(options: &[&str]) -> Vec<String> {
    options.iter().map(|s| s.to_string()).collect()
}

/// Global, one option per jurisdiction, then "multiple".
pub fn geographic_options(jurisdictions: &[String]) -> Vec<String> {
    let mut options = vec![GLOBAL_OPTION.to_string()];
    for j in jurisdictions {
        push_unique(&mut options, j);
    }
    options.push(MULTIPLE_REGIONS_OPTION.to_string());
    options
}

pub fn geographic_scope_request(
    session_id: Uuid,
    ctx: &EnrichedContext,
    jurisdictions: &[String],
    reason: &AmbiguityReason,
) -> ClarificationRequest {
    ClarificationRequest::new(
        session_id,
        ClarificationKind::GeographicScope,
        format!(
            "Which regions will \"{}\" launch in? Analysis is paused because {reason}.",
            ctx.original_feature_name
        ),
        geographic_options(jurisdictions),
        ctx.summary(),
    )
}

/// Build a request for a question raised mid-analysis, picking its kind
/// from the wording.
pub fn request_for_question(
    session_id: Uuid,
    question: &str,
    ctx: &EnrichedContext,
    jurisdictions: &[String],
) -> ClarificationRequest {
    let lower = question.to_lowercase();
    let (kind, options) = if ["region", "jurisdiction", "countr", "where", "state", "market", "geograph"]
        .iter()
        .any(|k| lower.contains(k))
    {
        (ClarificationKind::GeographicScope, geographic_options(jurisdictions))
    } else if lower.contains("risk") || lower.contains("severity") {
        (ClarificationKind::RiskAssessment, owned(RISK_OPTIONS))
    } else if lower.contains("category") || lower.contains("type of feature") || lower.contains("kind of feature") {
        (ClarificationKind::FeatureCategory, owned(CATEGORY_OPTIONS))
    } else {
        (ClarificationKind::ComplianceAmbiguity, owned(AMBIGUITY_OPTIONS))
    };
    ClarificationRequest::new(session_id, kind, question.trim(), options, ctx.summary())
}

/// What an answer resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Global,
    /// "Multiple regions" without naming them.
    NeedsList,
    Jurisdictions(Vec<String>),
    /// Geographic answer matching nothing known; carries the raw text.
    Unrecognized(String),
    Risk(String),
    Category(String),
    Note(String),
    /// A non-geographic question that timed out.
    Unanswered(ClarificationKind),
}

impl Interpretation {
    pub fn needs_follow_up(&self) -> bool {
        matches!(self, Self::NeedsList | Self::Unrecognized(_))
    }
}

pub struct ClarificationInterpreter {
    oracle: Option<Arc<dyn Oracle>>,
    vocabulary: JurisdictionVocabulary,
}

impl ClarificationInterpreter {
    pub fn new(vocabulary: JurisdictionVocabulary) -> Self {
        Self {
            oracle: None,
            vocabulary,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub async fn interpret(
        &self,
        request: &ClarificationRequest,
        response: &ClarificationResponse,
    ) -> Interpretation {
        if response.source == AnswerSource::Timeout
            && request.kind != ClarificationKind::GeographicScope
        {
            warn!(request_id = %request.id, kind = %request.kind, "clarification timed out; context unchanged");
            return Interpretation::Unanswered(request.kind);
        }
        let answer = resolve_option_number(response.answer_text.trim(), &request.options);
        let interpretation = match request.kind {
            ClarificationKind::GeographicScope => self.interpret_geography(&answer).await,
            ClarificationKind::RiskAssessment => {
                Interpretation::Risk(match_option(&answer, RISK_OPTIONS).unwrap_or(answer))
            }
            ClarificationKind::FeatureCategory => {
                Interpretation::Category(match_option(&answer, CATEGORY_OPTIONS).unwrap_or(answer))
            }
            ClarificationKind::ComplianceAmbiguity => Interpretation::Note(answer),
        };
        if response.source == AnswerSource::Timeout && interpretation.needs_follow_up() {
            warn!(request_id = %request.id, answer = %response.answer_text, "timeout answer not understood; treating as global");
            return Interpretation::Global;
        }
        interpretation
    }

    async fn interpret_geography(&self, answer: &str) -> Interpretation {
        let mut found = self.vocabulary.find_all(answer);
        for piece in answer.split([',', ';', '\n']).flat_map(|p| p.split(" and ")) {
            if let Some(name) = self.vocabulary.canonicalize(piece) {
                push_unique(&mut found, name);
            }
        }
        if !found.is_empty() {
            return Interpretation::Jurisdictions(found);
        }

        if is_bare_global(answer) {
            return Interpretation::Global;
        }
        let lower = answer.to_lowercase();
        if lower.contains("multiple") || lower.contains("several") {
            return Interpretation::NeedsList;
        }
        if self.oracle_says_global(answer).await {
            return Interpretation::Global;
        }
        Interpretation::Unrecognized(answer.to_string())
    }

    async fn oracle_says_global(&self, answer: &str) -> bool {
        let Some(oracle) = &self.oracle else {
            return false;
        };
        if answer.trim().is_empty() {
            return false;
        }
        let request = CompletionRequest::new(format!("Answer: {answer}"))
            .with_system(GLOBAL_INTENT_PROMPT)
            .with_limits(5, 0.0);
        match oracle.complete(&request).await {
            Ok(completion) => {
                let verdict = completion.content.trim().to_ascii_uppercase();
                debug!(answer, verdict = %verdict, "global intent");
                verdict.starts_with("YES")
            }
            Err(e) => {
                warn!(error = %e, "global intent oracle failed; using keywords only");
                false
            }
        }
    }
}

/// The whole answer is a global phrase or the global option. Negated or
/// qualified wording ("not worldwide") is not.
fn is_bare_global(answer: &str) -> bool {
    let normalized = answer
        .trim()
        .trim_end_matches(['.', '!'])
        .trim()
        .to_lowercase();
    normalized == GLOBAL_OPTION.to_lowercase() || GLOBAL_PHRASES.contains(&normalized.as_str())
}

/// A bare option number ("2") selects that option.
fn resolve_option_number(answer: &str, options: &[String]) -> String {
    match answer.parse::<usize>() {
        Ok(n) if n >= 1 && n <= options.len() => options[n - 1].clone(),
        _ => answer.to_string(),
    }
}

/// Option equal to, or contained in, the answer (case-insensitive).
fn match_option(answer: &str, options: &[&str]) -> Option<String> {
    let lower = answer.to_lowercase();
    options
        .iter()
        .find(|o| o.eq_ignore_ascii_case(answer.trim()))
        .or_else(|| options.iter().find(|o| lower.contains(&o.to_lowercase())))
        .map(|o| o.to_string())
}

/// Follow-up question for answers that need one.
pub fn follow_up_request(
    retired: &ClarificationRequest,
    interpretation: &Interpretation,
    jurisdictions: &[String],
) -> Option<ClarificationRequest> {
    let question = match interpretation {
        Interpretation::NeedsList => {
            "Which specific regions should be analyzed? List them separated by commas.".to_string()
        }
        Interpretation::Unrecognized(text) => format!(
            "\"{text}\" did not match a known jurisdiction. Which regions did you mean?"
        ),
        _ => return None,
    };
    let options = jurisdictions.to_vec();
    Some(ClarificationRequest::new(
        retired.session_id,
        ClarificationKind::GeographicScope,
        question,
        options,
        retired.context.clone(),
    ))
}

/// Apply a resolved answer to the context. Returns the audit resolution.
pub fn apply_interpretation(
    ctx: &mut EnrichedContext,
    interpretation: &Interpretation,
    jurisdictions: &[String],
) -> String {
    match interpretation {
        Interpretation::Global => {
            ctx.geographic_implications.clear();
            if jurisdictions.is_empty() {
                ctx.add_jurisdiction("Global");
            } else {
                for j in jurisdictions {
                    ctx.add_jurisdiction(j);
                }
            }
            format!("global scope: {}", ctx.geographic_implications.join(", "))
        }
        Interpretation::Jurisdictions(found) => {
            ctx.geographic_implications.clear();
            for j in found {
                ctx.add_jurisdiction(j);
            }
            format!("jurisdictions: {}", ctx.geographic_implications.join(", "))
        }
        Interpretation::Risk(level) => {
            let indicator = format!("user-assessed risk: {level}");
            ctx.add_risk_indicator(&indicator);
            indicator
        }
        Interpretation::Category(category) => {
            ctx.feature_category = category.clone();
            format!("category: {category}")
        }
        Interpretation::Note(text) => {
            ctx.note(format!("clarification: {text}"));
            if !text.is_empty() {
                ctx.expanded_description.push_str(&format!(" Clarification: {text}"));
            }
            format!("note: {text}")
        }
        Interpretation::Unanswered(kind) => {
            ctx.note(format!("{kind} clarification timed out; context unchanged"));
            "no answer; context unchanged".to_string()
        }
        Interpretation::NeedsList | Interpretation::Unrecognized(_) => {
            "unresolved; follow-up required".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regscope_ai::oracle::{Completion, OracleError};
    use async_trait::async_trait;
    use regscope_core::context::FeatureInput;

    struct YesOracle;

    #[async_trait]
    impl Oracle for YesOracle {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, OracleError> {
            Ok(Completion {
                content: "YES".into(),
                tokens_used: 1,
            })
        }
    }

    fn vocab() -> JurisdictionVocabulary {
        JurisdictionVocabulary::builtin()
    }

    fn juris() -> Vec<String> {
        vec!["Utah".into(), "European Union".into(), "Florida".into()]
    }

    fn geo_request() -> ClarificationRequest {
        ClarificationRequest::new(
            Uuid::now_v7(),
            ClarificationKind::GeographicScope,
            "Where?",
            geographic_options(&juris()),
            "",
        )
    }

    #[test]
    fn short_vague_feature_is_ambiguous() {
        let ctx = EnrichedContext::new(&FeatureInput::new("New feature", "Update"));
        assert_eq!(
            detect_ambiguity(&ctx, &vocab(), 50),
            Some(AmbiguityReason::NoGeography)
        );
        let req = geographic_scope_request(
            Uuid::now_v7(),
            &ctx,
            &juris(),
            &AmbiguityReason::NoGeography,
        );
        assert_eq!(req.kind, ClarificationKind::GeographicScope);
        assert_eq!(req.options[0], "Global (all regions)");
        assert_eq!(req.options.last().map(String::as_str), Some("Multiple specific regions"));
        assert!(req.options.contains(&"Utah".to_string()));
    }

    #[test]
    fn generic_or_unknown_regions_are_ambiguous() {
        let long = "A sufficiently long description of the feature that passes the length check.";
        let mut ctx = EnrichedContext::new(&FeatureInput::new("Feed", long));
        ctx.geographic_implications = vec!["Global".into()];
        assert!(matches!(
            detect_ambiguity(&ctx, &vocab(), 50),
            Some(AmbiguityReason::GenericGeography(_))
        ));
        ctx.geographic_implications = vec!["Atlantis".into()];
        assert!(matches!(
            detect_ambiguity(&ctx, &vocab(), 50),
            Some(AmbiguityReason::UnknownRegions(_))
        ));
        ctx.geographic_implications = vec!["Utah".into()];
        assert_eq!(detect_ambiguity(&ctx, &vocab(), 50), None);
    }

    #[test]
    fn short_description_is_ambiguous_even_with_regions() {
        let mut ctx = EnrichedContext::new(&FeatureInput::new("Feed", "EU feed"));
        ctx.geographic_implications = vec!["European Union".into()];
        assert!(matches!(
            detect_ambiguity(&ctx, &vocab(), 50),
            Some(AmbiguityReason::ShortDescription { chars: 7, min: 50 })
        ));
    }

    #[test]
    fn question_wording_picks_kind() {
        let ctx = EnrichedContext::default();
        let id = Uuid::now_v7();
        let kind = |q: &str| request_for_question(id, q, &ctx, &juris()).kind;
        assert_eq!(kind("Which regions is this launching in?"), ClarificationKind::GeographicScope);
        assert_eq!(kind("What risk level do you assign?"), ClarificationKind::RiskAssessment);
        assert_eq!(kind("What category is this?"), ClarificationKind::FeatureCategory);
        assert_eq!(kind("Is the logging on by default?"), ClarificationKind::ComplianceAmbiguity);
    }

    #[tokio::test]
    async fn global_keywords_and_timeout_default() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let timeout = ClarificationResponse::timeout(&req, "All Regions");
        assert_eq!(interp.interpret(&req, &timeout).await, Interpretation::Global);
        let human = ClarificationResponse::human(&req, "Global (all regions)");
        assert_eq!(interp.interpret(&req, &human).await, Interpretation::Global);
    }

    #[tokio::test]
    async fn negated_global_wording_keeps_named_jurisdictions() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let resp = ClarificationResponse::human(&req, "Utah only, not global");
        assert_eq!(
            interp.interpret(&req, &resp).await,
            Interpretation::Jurisdictions(vec!["Utah".into()])
        );
        let resp = ClarificationResponse::human(&req, "Not worldwide, just the EU");
        assert_eq!(
            interp.interpret(&req, &resp).await,
            Interpretation::Jurisdictions(vec!["European Union".into()])
        );
        let resp = ClarificationResponse::human(&req, "not global");
        assert_eq!(
            interp.interpret(&req, &resp).await,
            Interpretation::Unrecognized("not global".into())
        );
    }

    #[tokio::test]
    async fn option_number_selects_option() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let resp = ClarificationResponse::human(&req, "2");
        assert_eq!(
            interp.interpret(&req, &resp).await,
            Interpretation::Jurisdictions(vec!["Utah".into()])
        );
    }

    #[tokio::test]
    async fn abbreviations_and_lists_resolve() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let resp = ClarificationResponse::human(&req, "EU, UT and florida");
        assert_eq!(
            interp.interpret(&req, &resp).await,
            Interpretation::Jurisdictions(vec![
                "European Union".into(),
                "Utah".into(),
                "Florida".into()
            ])
        );
    }

    #[tokio::test]
    async fn multiple_without_names_needs_list() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let resp = ClarificationResponse::human(&req, "Multiple specific regions");
        let i = interp.interpret(&req, &resp).await;
        assert_eq!(i, Interpretation::NeedsList);
        let next = follow_up_request(&req, &i, &juris()).unwrap();
        assert!(next.question.contains("specific regions"));
    }

    #[tokio::test]
    async fn unrecognized_answer_is_quoted_in_follow_up() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let resp = ClarificationResponse::human(&req, "Narnia");
        let i = interp.interpret(&req, &resp).await;
        assert_eq!(i, Interpretation::Unrecognized("Narnia".into()));
        let next = follow_up_request(&req, &i, &juris()).unwrap();
        assert!(next.question.contains("\"Narnia\""));
        assert_eq!(next.session_id, req.session_id);
    }

    #[tokio::test]
    async fn unrecognized_timeout_answer_is_global() {
        let interp = ClarificationInterpreter::new(vocab());
        let req = geo_request();
        let resp = ClarificationResponse::timeout(&req, "Narnia");
        assert_eq!(interp.interpret(&req, &resp).await, Interpretation::Global);
    }

    #[tokio::test]
    async fn oracle_classifies_global_intent() {
        let interp = ClarificationInterpreter::new(vocab()).with_oracle(Arc::new(YesOracle));
        let req = geo_request();
        let resp = ClarificationResponse::human(&req, "the whole planet");
        assert_eq!(interp.interpret(&req, &resp).await, Interpretation::Global);
    }

    #[tokio::test]
    async fn non_geographic_kinds() {
        let interp = ClarificationInterpreter::new(vocab());
        let id = Uuid::now_v7();
        let ctx = EnrichedContext::default();
        let risk = request_for_question(id, "What risk level?", &ctx, &[]);
        let resp = ClarificationResponse::human(&risk, "pretty high I think");
        assert_eq!(interp.interpret(&risk, &resp).await, Interpretation::Risk("High".into()));

        let cat = request_for_question(id, "Which category?", &ctx, &[]);
        let resp = ClarificationResponse::human(&cat, "gaming");
        assert_eq!(interp.interpret(&cat, &resp).await, Interpretation::Category("gaming".into()));
    }

    #[tokio::test]
    async fn timed_out_non_geographic_questions_leave_context_alone() {
        let interp = ClarificationInterpreter::new(vocab());
        let id = Uuid::now_v7();
        let mut ctx = EnrichedContext::default();
        ctx.feature_category = "Payments".into();
        for question in ["What risk level?", "Which category?", "Is logging on by default?"] {
            let req = request_for_question(id, question, &ctx, &[]);
            let resp = ClarificationResponse::timeout(&req, "All Regions");
            let i = interp.interpret(&req, &resp).await;
            assert_eq!(i, Interpretation::Unanswered(req.kind));
            assert!(!i.needs_follow_up());
            apply_interpretation(&mut ctx, &i, &[]);
        }
        assert!(ctx.risk_indicators.is_empty());
        assert_eq!(ctx.feature_category, "Payments");
        assert!(!ctx.expanded_description.contains("All Regions"));
        assert_eq!(ctx.processing_notes.len(), 3);
        assert!(ctx.processing_notes[0].starts_with("risk-assessment clarification timed out"));
    }

    #[test]
    fn apply_global_uses_registry_jurisdictions() {
        let mut ctx = EnrichedContext::default();
        let resolution = apply_interpretation(&mut ctx, &Interpretation::Global, &juris());
        assert_eq!(ctx.geographic_implications, juris());
        assert!(resolution.starts_with("global scope"));

        let mut ctx = EnrichedContext::default();
        apply_interpretation(&mut ctx, &Interpretation::Global, &[]);
        assert_eq!(ctx.geographic_implications, vec!["Global"]);
    }

    #[test]
    fn apply_non_geographic() {
        let mut ctx = EnrichedContext::default();
        apply_interpretation(&mut ctx, &Interpretation::Risk("High".into()), &[]);
        assert_eq!(ctx.risk_indicators, vec!["user-assessed risk: High"]);
        apply_interpretation(&mut ctx, &Interpretation::Category("Payments".into()), &[]);
        assert_eq!(ctx.feature_category, "Payments");
        apply_interpretation(&mut ctx, &Interpretation::Note("Only EU adults".into()), &[]);
        assert!(ctx.expanded_description.contains("Clarification: Only EU adults"));
        assert_eq!(ctx.processing_notes, vec!["clarification: Only EU adults"]);
    }
}
