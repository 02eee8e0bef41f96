//! Enrichment retry engine.
//!
//! Turns a raw [`FeatureInput`] into an [`EnrichedContext`]: deterministic
//! extraction first, then an optional oracle pass, retried while the context
//! is incomplete and the retry budget lasts. Never fails; every degradation is
//! written to `processing_notes`.

use std::sync::Arc;

use regscope_core::config::EnrichmentConfig;
use regscope_core::context::{EnrichedContext, FeatureInput};
use regscope_core::glossary::Glossary;
use regscope_core::jurisdiction::{JurisdictionVocabulary, is_generic_region};
use regscope_core::session::MAX_ENRICHMENT_RETRIES;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::json::{parse_json_object, snippet, string_field, string_list};
use crate::oracle::{CompletionRequest, Oracle, OracleError};
use crate::signals::{DEFAULT_CATEGORY, SignalExtractor};

const SYSTEM_PROMPT: &str = "\
You are a compliance analyst preparing product features for legal review.

Given a feature name, description and the signals already extracted from it, produce a \
richer analysis. Expand internal jargon, infer which jurisdictions the feature touches, \
classify the feature and list its regulatory risk indicators.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"expanded_description\": \"plain-language description with jargon expanded\",
  \"geographic_implications\": [\"jurisdiction names\"],
  \"feature_category\": \"one short category\",
  \"risk_indicators\": [\"short risk labels\"],
  \"terminology_expansions\": {\"ABBR\": \"meaning\"}
}

Use an empty list when a field cannot be determined. Do not invent jurisdictions that \
the feature does not mention or clearly imply.";

fn build_user_prompt(
    input: &FeatureInput,
    ctx: &EnrichedContext,
    known: &[&str],
    missing: &[&'static str],
) -> String {
    let mut prompt = format!(
        "Feature name: {name}\n\
         Description: {desc}\n",
        name = input.name.trim(),
        desc = input.description.trim(),
    );
    for (i, doc) in input.documents.iter().enumerate() {
        prompt.push_str(&format!("\nSupporting document {}:\n{}\n", i + 1, doc.trim()));
    }
    prompt.push_str(&format!(
        "\nSignals extracted so far:\n{summary}\n\
         \nKnown jurisdictions: {known}\n",
        summary = ctx.summary(),
        known = known.join(", "),
    ));
    if !missing.is_empty() {
        prompt.push_str(&format!(
            "\nRETRY GUIDANCE: the previous analysis was incomplete. \
             Fill in these fields with specific content: {}. \
             The expanded description must add concrete detail beyond the feature name.\n",
            missing.join(", ")
        ));
    }
    prompt
}

pub struct EnrichmentEngine {
    oracle: Option<Arc<dyn Oracle>>,
    glossary: Glossary,
    vocabulary: JurisdictionVocabulary,
    signals: SignalExtractor,
    max_retries: u32,
    max_tokens: u32,
    temperature: f32,
}

impl EnrichmentEngine {
    pub fn new(config: &EnrichmentConfig) -> Self {
        Self {
            oracle: None,
            glossary: Glossary::builtin().with_terms(&config.extra_terms),
            vocabulary: JurisdictionVocabulary::builtin(),
            signals: SignalExtractor::new(),
            max_retries: config.max_retries.min(MAX_ENRICHMENT_RETRIES),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Replace the vocabulary, e.g. with one extended by discovered tools.
    pub fn with_vocabulary(mut self, vocabulary: JurisdictionVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn vocabulary(&self) -> &JurisdictionVocabulary {
        &self.vocabulary
    }

    /// Cheap keyword-based context; no oracle involved.
    pub fn extract_signals(&self, input: &FeatureInput) -> EnrichedContext {
        let mut ctx = EnrichedContext::new(input);
        let text = input.full_text();

        ctx.terminology_expansions = self.glossary.find_terms(&text);
        let base = if ctx.original_description.is_empty() {
            ctx.original_feature_name.clone()
        } else {
            ctx.original_description.clone()
        };
        ctx.expanded_description = self.glossary.expand(&base);

        for jurisdiction in self.vocabulary.find_all(&text) {
            ctx.add_jurisdiction(jurisdiction);
        }
        for indicator in self.signals.risk_indicators(&text) {
            ctx.add_risk_indicator(indicator);
        }
        ctx.feature_category = self
            .signals
            .category(&text)
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        ctx
    }

    /// Build the enriched context. Retries are bounded by the configured
    /// budget and never exceed [`MAX_ENRICHMENT_RETRIES`].
    pub async fn enrich(&self, input: &FeatureInput) -> EnrichedContext {
        let mut ctx = self.extract_signals(input);

        let Some(oracle) = &self.oracle else {
            if !ctx.is_complete() {
                ctx.note(format!(
                    "context incomplete (missing: {}); no oracle configured, retries skipped",
                    ctx.missing_fields().join(", ")
                ));
            }
            return ctx;
        };

        let mut missing: Vec<&'static str> = Vec::new();
        loop {
            if let Err(e) = self.oracle_pass(oracle.as_ref(), input, &mut ctx, &missing).await {
                warn!(feature = %input.name, retry = ctx.enrichment_retries, error = %e, "oracle enrichment failed");
                ctx.note(format!("oracle enrichment failed: {e}; extracted signals kept"));
            }
            if ctx.is_complete() {
                info!(feature = %input.name, retries = ctx.enrichment_retries, "enrichment complete");
                return ctx;
            }
            if ctx.enrichment_retries >= self.max_retries {
                let note = format!(
                    "completeness not reached after {} retr{}; missing: {}",
                    ctx.enrichment_retries,
                    if ctx.enrichment_retries == 1 { "y" } else { "ies" },
                    ctx.missing_fields().join(", ")
                );
                warn!(feature = %input.name, "{note}");
                ctx.note(note);
                return ctx;
            }
            ctx.enrichment_retries += 1;
            missing = ctx.missing_fields();
            info!(feature = %input.name, retry = ctx.enrichment_retries, missing = ?missing, "retrying enrichment");
            ctx.note(format!(
                "retry {}: missing {}",
                ctx.enrichment_retries,
                missing.join(", ")
            ));
        }
    }

    async fn oracle_pass(
        &self,
        oracle: &dyn Oracle,
        input: &FeatureInput,
        ctx: &mut EnrichedContext,
        missing: &[&'static str],
    ) -> Result<(), OracleError> {
        let known = self.vocabulary.canonical_names();
        let prompt = build_user_prompt(input, ctx, &known, missing);
        debug!(prompt = %prompt, "enrichment prompt");
        let request = CompletionRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .with_limits(self.max_tokens, self.temperature);
        let completion = oracle.complete(&request).await?;
        let value = parse_json_object(&completion.content).ok_or_else(|| {
            OracleError::Malformed(format!(
                "no JSON object in enrichment reply: {}",
                snippet(&completion.content, 200)
            ))
        })?;
        self.merge(ctx, &value);
        Ok(())
    }

    /// Overwrite fields the oracle returned non-empty.
    fn merge(&self, ctx: &mut EnrichedContext, value: &Value) {
        if let Some(desc) = string_field(value, "expanded_description") {
            ctx.expanded_description = desc;
        }
        if let Some(category) = string_field(value, "feature_category") {
            ctx.feature_category = category;
        }

        let regions = string_list(value, "geographic_implications");
        if !regions.is_empty() {
            ctx.geographic_implications.clear();
            for region in regions {
                let name = if is_generic_region(&region) {
                    region
                } else {
                    self.vocabulary.canonicalize(&region).unwrap_or(region)
                };
                ctx.add_jurisdiction(name);
            }
        }

        let risks = string_list(value, "risk_indicators");
        if !risks.is_empty() {
            ctx.risk_indicators.clear();
            for risk in risks {
                ctx.add_risk_indicator(risk);
            }
        }

        if let Some(Value::Object(terms)) = value.get("terminology_expansions") {
            for (abbr, meaning) in terms {
                if let Some(meaning) = meaning.as_str()
                    && !meaning.trim().is_empty()
                {
                    ctx.terminology_expansions
                        .insert(abbr.clone(), meaning.trim().to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::Completion;
    use async_trait::async_trait;
    use regscope_core::config::EnrichmentConfig;
    use std::sync::Mutex;

    /// Replies from a fixed script, repeating the last reply when exhausted.
    struct ScriptedOracle {
        replies: Mutex<Vec<Result<String, ()>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<Result<&str, ()>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.pop()
            } else {
                replies.last().cloned()
            };
            match reply {
                Some(Ok(content)) => Ok(Completion {
                    content,
                    tokens_used: 10,
                }),
                _ => Err(OracleError::Transport("connection refused".into())),
            }
        }
    }

    fn engine() -> EnrichmentEngine {
        EnrichmentEngine::new(&EnrichmentConfig::default())
    }

    #[test]
    fn deterministic_extraction_finds_signals() {
        let input = FeatureInput::new(
            "Curfew login blocker with ASL and GH for Utah minors",
            "To comply with the Utah Social Media Regulation Act, we use ASL to detect minor \
             users and GH to route enforcement to Utah accounts during curfew hours.",
        );
        let ctx = engine().extract_signals(&input);
        assert_eq!(ctx.geographic_implications, vec!["Utah"]);
        assert!(ctx.risk_indicators.contains(&"minors".to_string()));
        assert!(ctx.risk_indicators.contains(&"location".to_string()));
        assert!(ctx.terminology_expansions.contains_key("ASL"));
        assert!(ctx.expanded_description.contains("ASL (age-sensitive logic)"));
        assert_eq!(ctx.feature_category, "Age Verification");
    }

    #[test]
    fn default_category_when_no_signal() {
        let ctx = engine().extract_signals(&FeatureInput::new("New feature", "Update"));
        assert_eq!(ctx.feature_category, "General Feature");
        assert!(ctx.geographic_implications.is_empty());
    }

    #[tokio::test]
    async fn without_oracle_returns_single_note() {
        let ctx = engine().enrich(&FeatureInput::new("New feature", "Update")).await;
        assert!(!ctx.is_complete());
        assert_eq!(ctx.enrichment_retries, 0);
        assert_eq!(ctx.processing_notes.len(), 1);
        assert!(ctx.processing_notes[0].contains("no oracle"));
    }

    #[tokio::test]
    async fn oracle_fields_replace_fallback() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(r#"```json
            {"expanded_description": "A personalised video feed for European users with ranking signals",
             "geographic_implications": ["EU", "Global"],
             "feature_category": "Recommendation System",
             "risk_indicators": ["recommendation/personalization", "personal data"],
             "terminology_expansions": {"PF": "personalized feed"}}
            ```"#)]));
        let engine = engine().with_oracle(oracle.clone());
        let ctx = engine.enrich(&FeatureInput::new("PF v2", "PF for EU")).await;
        assert!(ctx.is_complete());
        assert_eq!(ctx.geographic_implications, vec!["European Union", "Global"]);
        assert_eq!(ctx.feature_category, "Recommendation System");
        assert_eq!(ctx.enrichment_retries, 0);
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn retries_stop_at_budget() {
        // Never supplies geography, so the context stays incomplete.
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            r#"{"expanded_description": "Detailed description of the feature behaviour", "feature_category": "Payments", "risk_indicators": ["payments"]}"#,
        )]));
        let engine = engine().with_oracle(oracle.clone());
        let ctx = engine.enrich(&FeatureInput::new("Tips", "Creator tipping")).await;
        assert!(!ctx.is_complete());
        assert_eq!(ctx.enrichment_retries, MAX_ENRICHMENT_RETRIES);
        assert_eq!(oracle.calls(), 1 + MAX_ENRICHMENT_RETRIES as usize);
        assert!(
            ctx.processing_notes
                .iter()
                .any(|n| n.contains("completeness not reached"))
        );
        let prompts = oracle.prompts.lock().unwrap();
        assert!(prompts[1].contains("RETRY GUIDANCE"));
        assert!(prompts[1].contains("geographic_implications"));
    }

    #[tokio::test]
    async fn retry_can_complete_context() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok("I am not sure."),
            Ok(r#"{"expanded_description": "Creator tipping with in-app payments for Brazil", "geographic_implications": ["Brazil"], "feature_category": "Payments", "risk_indicators": ["payments"]}"#),
        ]));
        let engine = engine().with_oracle(oracle.clone());
        let ctx = engine.enrich(&FeatureInput::new("Tips", "Creator tipping")).await;
        assert!(ctx.is_complete());
        assert_eq!(ctx.enrichment_retries, 1);
        assert!(ctx.processing_notes.iter().any(|n| n.contains("malformed")));
    }

    #[tokio::test]
    async fn oracle_errors_keep_extracted_fields() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(())]));
        let engine = engine().with_oracle(oracle);
        let ctx = engine
            .enrich(&FeatureInput::new("Feed", "Personalized feed for Utah teens"))
            .await;
        assert_eq!(ctx.geographic_implications, vec!["Utah"]);
        assert!(ctx.enrichment_retries <= MAX_ENRICHMENT_RETRIES);
        assert!(
            ctx.processing_notes
                .iter()
                .any(|n| n.contains("oracle enrichment failed"))
        );
    }
}
