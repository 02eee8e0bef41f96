//! Internal jargon and abbreviations found in feature descriptions.
//!
//! Terms are matched case-sensitively as whole words: "NR" is an
//! abbreviation, "nr" is not.

use std::collections::BTreeMap;

use regex::Regex;

const BUILTIN_TERMS: &[(&str, &str)] = &[
    ("ASL", "age-sensitive logic"),
    ("BB", "baseline behavior used for anomaly detection"),
    ("CDS", "compliance detection system"),
    ("DRT", "data retention threshold"),
    ("EchoTrace", "log tracing mode used to verify compliance routing"),
    ("FR", "feature rollout status"),
    ("GH", "geo-handler that routes features by user region"),
    ("Glow", "compliance-flagging status for geo-based alerts"),
    ("IMT", "internal monitoring trigger"),
    ("Jellybean", "internal parental control system"),
    ("LCP", "local compliance policy"),
    ("NR", "not recommended"),
    ("NSP", "non-shareable policy"),
    ("PF", "personalized feed"),
    ("Redline", "flag for legal review"),
    ("ShadowMode", "deployment that collects analytics without user impact"),
    ("Snowcap", "child safety policy framework"),
    ("Softblock", "silent user-level limitation without notification"),
    ("Spanner", "rule engine"),
    ("T5", "tier 5 sensitivity data"),
];

#[derive(Debug, Clone)]
struct Term {
    abbreviation: String,
    meaning: String,
    pattern: Option<Regex>,
}

impl Term {
    fn new(abbreviation: &str, meaning: &str) -> Self {
        let pattern = Regex::new(&format!(
            r"(?:^|[^\w])({})(?:$|[^\w])",
            regex::escape(abbreviation)
        ))
        .ok();
        Self {
            abbreviation: abbreviation.to_string(),
            meaning: meaning.to_string(),
            pattern,
        }
    }

    /// Byte span of the first whole-word occurrence.
    fn first_span(&self, text: &str) -> Option<(usize, usize)> {
        let caps = self.pattern.as_ref()?.captures(text)?;
        let m = caps.get(1)?;
        Some((m.start(), m.end()))
    }
}

/// Abbreviation → meaning table used for deterministic jargon expansion.
#[derive(Debug, Clone)]
pub struct Glossary {
    terms: Vec<Term>,
}

impl Default for Glossary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Glossary {
    pub fn builtin() -> Self {
        Self {
            terms: BUILTIN_TERMS.iter().map(|(a, m)| Term::new(a, m)).collect(),
        }
    }

    /// Add or override terms.
    pub fn with_terms<'a>(mut self, extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (abbr, meaning) in extra {
            let abbr = abbr.trim();
            if abbr.is_empty() {
                continue;
            }
            self.terms.retain(|t| t.abbreviation != abbr);
            self.terms.push(Term::new(abbr, meaning.trim()));
        }
        self
    }

    pub fn lookup(&self, abbreviation: &str) -> Option<&str> {
        self.terms
            .iter()
            .find(|t| t.abbreviation == abbreviation)
            .map(|t| t.meaning.as_str())
    }

    /// Terms that occur in `text`.
    pub fn find_terms(&self, text: &str) -> BTreeMap<String, String> {
        self.terms
            .iter()
            .filter(|t| t.first_span(text).is_some())
            .map(|t| (t.abbreviation.clone(), t.meaning.clone()))
            .collect()
    }

    /// Rewrite the first occurrence of each term as `TERM (meaning)`.
    pub fn expand(&self, text: &str) -> String {
        let mut spans: Vec<(usize, usize, &Term)> = self
            .terms
            .iter()
            .filter_map(|t| t.first_span(text).map(|(s, e)| (s, e, t)))
            .collect();
        spans.sort_by_key(|(start, _, _)| *start);

        let mut out = String::with_capacity(text.len() + spans.len() * 24);
        let mut cursor = 0;
        for (start, end, term) in spans {
            if start < cursor {
                continue;
            }
            out.push_str(&text[cursor..end]);
            out.push_str(" (");
            out.push_str(&term.meaning);
            out.push(')');
            cursor = end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}
