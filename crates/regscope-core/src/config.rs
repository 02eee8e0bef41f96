//! Runtime configuration.
//!
//! Loaded from a JSON file where every field is optional; missing sections
//! fall back to defaults. Loop caps are clamped to the hard limits in
//! [`crate::session`] so a config file can only lower them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::session::{MAX_ENRICHMENT_RETRIES, MAX_REASONING_ITERATIONS};

/// Default answer injected when a clarification times out.
pub const DEFAULT_TIMEOUT_ANSWER: &str = "All Regions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_iterations: MAX_REASONING_ITERATIONS,
            max_tokens: 800,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub max_retries: u32,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Additional glossary entries, abbreviation → meaning.
    pub extra_terms: BTreeMap<String, String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_ENRICHMENT_RETRIES,
            max_tokens: 1000,
            temperature: 0.2,
            extra_terms: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClarificationConfig {
    /// When false, ambiguity and clarify decisions never suspend the session.
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub timeout_answer: String,
    /// Descriptions shorter than this are treated as ambiguous.
    pub min_description_chars: usize,
}

impl Default for ClarificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            max_polls: 60,
            timeout_answer: DEFAULT_TIMEOUT_ANSWER.to_string(),
            min_description_chars: 50,
        }
    }
}

impl ClarificationConfig {
    /// Total wait before the timeout answer is injected.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.saturating_mul(u64::from(self.max_polls)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
        }
    }
}

/// Network settings for the oracle and search adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub oracle_timeout_secs: u64,
    pub search_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_secs: 60,
            search_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegscopeConfig {
    pub reasoning: ReasoningConfig,
    pub enrichment: EnrichmentConfig,
    pub clarification: ClarificationConfig,
    pub synthesis: SynthesisConfig,
    pub batch: BatchConfig,
    pub transport: TransportConfig,
}

impl RegscopeConfig {
    /// Read, clamp and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RegscopeConfig = serde_json::from_slice(&bytes)?;
        let config = config.clamped();
        config.validate()?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// [`RegscopeConfig::load`] when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Lower loop caps that exceed the hard limits.
    pub fn clamped(mut self) -> Self {
        if self.reasoning.max_iterations > MAX_REASONING_ITERATIONS {
            warn!(
                requested = self.reasoning.max_iterations,
                cap = MAX_REASONING_ITERATIONS,
                "reasoning.max_iterations clamped"
            );
            self.reasoning.max_iterations = MAX_REASONING_ITERATIONS;
        }
        if self.enrichment.max_retries > MAX_ENRICHMENT_RETRIES {
            warn!(
                requested = self.enrichment.max_retries,
                cap = MAX_ENRICHMENT_RETRIES,
                "enrichment.max_retries clamped"
            );
            self.enrichment.max_retries = MAX_ENRICHMENT_RETRIES;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reasoning.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "reasoning.max_iterations must be at least 1".into(),
            ));
        }
        for (label, t) in [
            ("reasoning.temperature", self.reasoning.temperature),
            ("enrichment.temperature", self.enrichment.temperature),
            ("synthesis.temperature", self.synthesis.temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "{label} must be within [0, 2] (got {t})"
                )));
            }
        }
        if self.clarification.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "clarification.poll_interval_ms must be positive".into(),
            ));
        }
        if self.clarification.max_polls == 0 {
            return Err(ConfigError::Invalid(
                "clarification.max_polls must be positive".into(),
            ));
        }
        if self.clarification.timeout_answer.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "clarification.timeout_answer must be non-empty".into(),
            ));
        }
        if self.batch.max_concurrent_sessions == 0 {
            return Err(ConfigError::Invalid(
                "batch.max_concurrent_sessions must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Pretty JSON, suitable as a starting config file.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let c = RegscopeConfig::default();
        assert_eq!(c.reasoning.max_iterations, 5);
        assert_eq!(c.enrichment.max_retries, 2);
        assert_eq!(c.clarification.max_polls, 60);
        assert_eq!(c.clarification.poll_interval_ms, 1000);
        assert_eq!(c.clarification.timeout_answer, "All Regions");
        assert_eq!(c.clarification.timeout(), std::time::Duration::from_secs(60));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: RegscopeConfig =
            serde_json::from_str(r#"{"reasoning": {"max_tokens": 1200}}"#).unwrap();
        assert_eq!(c.reasoning.max_tokens, 1200);
        assert_eq!(c.reasoning.max_iterations, 5);
        assert_eq!(c.batch.max_concurrent_sessions, 4);
    }

    #[test]
    fn caps_are_clamped() {
        let c: RegscopeConfig = serde_json::from_str(
            r#"{"reasoning": {"max_iterations": 12}, "enrichment": {"max_retries": 9}}"#,
        )
        .unwrap();
        let c = c.clamped();
        assert_eq!(c.reasoning.max_iterations, 5);
        assert_eq!(c.enrichment.max_retries, 2);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = RegscopeConfig::default();
        c.clarification.poll_interval_ms = 0;
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));

        let mut c = RegscopeConfig::default();
        c.clarification.timeout_answer = "  ".into();
        assert!(c.validate().is_err());

        let mut c = RegscopeConfig::default();
        c.synthesis.temperature = 3.0;
        assert!(c.validate().is_err());

        let mut c = RegscopeConfig::default();
        c.batch.max_concurrent_sessions = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"clarification": {{"max_polls": 5}}}}"#).unwrap();
        let c = RegscopeConfig::load(file.path()).unwrap();
        assert_eq!(c.clarification.max_polls, 5);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = RegscopeConfig::load(Path::new("/nonexistent/regscope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_invalid_json_is_json_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = RegscopeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
