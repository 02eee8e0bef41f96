//! Feature input and the enriched context the reasoning loop works from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ordered::push_unique;

/// Minimum number of characters the expanded description must add over the
/// feature name before the context counts as complete.
pub const MIN_DESCRIPTION_GAIN: usize = 10;

/// A product feature as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInput {
    #[serde(default)]
    pub feature_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Extra free text (PRD excerpts, tickets) used for signal extraction.
    #[serde(default)]
    pub documents: Vec<String>,
}

impl FeatureInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            feature_id: None,
            name: name.into(),
            description: description.into(),
            documents: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.feature_id = Some(id.into());
        self
    }

    pub fn with_document(mut self, text: impl Into<String>) -> Self {
        self.documents.push(text.into());
        self
    }

    /// The caller's id, or a fresh time-ordered UUID.
    pub fn resolved_id(&self) -> String {
        self.feature_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::now_v7().to_string())
    }

    /// Name, description and documents joined for keyword scanning.
    pub fn full_text(&self) -> String {
        let mut text = format!("{}\n{}", self.name, self.description);
        for doc in &self.documents {
            text.push_str("\n\n");
            text.push_str(doc);
        }
        text
    }
}

/// Feature context after jargon expansion and signal inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContext {
    pub original_feature_name: String,
    pub original_description: String,
    pub expanded_description: String,
    /// Canonical jurisdiction names, ordered set.
    pub geographic_implications: Vec<String>,
    pub feature_category: String,
    /// Ordered set.
    pub risk_indicators: Vec<String>,
    pub terminology_expansions: BTreeMap<String, String>,
    pub processing_notes: Vec<String>,
    pub enrichment_retries: u32,
}

impl EnrichedContext {
    /// Empty context for a feature; every inferred field starts blank.
    pub fn new(input: &FeatureInput) -> Self {
        Self {
            original_feature_name: input.name.trim().to_string(),
            original_description: input.description.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn add_jurisdiction(&mut self, name: impl AsRef<str>) -> bool {
        push_unique(&mut self.geographic_implications, name)
    }

    pub fn add_risk_indicator(&mut self, indicator: impl AsRef<str>) -> bool {
        push_unique(&mut self.risk_indicators, indicator)
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.processing_notes.push(note.into());
    }

    /// Fields that keep the context from being complete, in a stable order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        let name_len = self.original_feature_name.chars().count();
        let desc_len = self.expanded_description.trim().chars().count();
        if desc_len == 0 {
            missing.push("expanded_description");
        } else if desc_len <= name_len + MIN_DESCRIPTION_GAIN {
            missing.push("expanded_description_detail");
        }
        if self.feature_category.trim().is_empty() {
            missing.push("feature_category");
        }
        if self.geographic_implications.is_empty() {
            missing.push("geographic_implications");
        }
        if self.risk_indicators.is_empty() {
            missing.push("risk_indicators");
        }
        missing
    }

    /// Completeness predicate gating enrichment retries.
    ///
    /// Description, category, geography and risk indicators must all be
    /// present, at least one signal list must be non-empty, and the expanded
    /// description must be more than [`MIN_DESCRIPTION_GAIN`] characters
    /// longer than the feature name.
    pub fn is_complete(&self) -> bool {
        let has_signal =
            !self.risk_indicators.is_empty() || !self.geographic_implications.is_empty();
        has_signal && self.missing_fields().is_empty()
    }

    /// One-paragraph rendering used inside oracle prompts.
    pub fn summary(&self) -> String {
        let geo = if self.geographic_implications.is_empty() {
            "none identified".to_string()
        } else {
            self.geographic_implications.join(", ")
        };
        let risks = if self.risk_indicators.is_empty() {
            "none identified".to_string()
        } else {
            self.risk_indicators.join(", ")
        };
        let terms = if self.terminology_expansions.is_empty() {
            "none".to_string()
        } else {
            self.terminology_expansions
                .iter()
                .map(|(abbr, meaning)| format!("{abbr} = {meaning}"))
                .collect::<Vec<_>>()
                .join("; ")
        };
        format!(
            "Feature: {name}\n\
             Description: {desc}\n\
             Category: {category}\n\
             Geographic implications: {geo}\n\
             Risk indicators: {risks}\n\
             Terminology: {terms}",
            name = self.original_feature_name,
            desc = self.expanded_description,
            category = if self.feature_category.is_empty() {
                "unknown"
            } else {
                &self.feature_category
            },
        )
    }
}
