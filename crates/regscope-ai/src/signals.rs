//! Keyword-driven risk and category signals.
//!
//! Lower-case keywords match case-insensitively at a word start, so
//! `personaliz` catches "personalized" and "personalization". Keywords
//! containing upper-case letters are acronyms and match case-sensitively as
//! whole words.

use regex::Regex;

const RISK_SIGNALS: &[(&str, &[&str])] = &[
    (
        "minors",
        &[
            "minor", "child", "children", "teen", "underage", "under 18", "under 13",
            "age verification", "age gate", "age-gate", "parental", "kids", "ASL", "Jellybean",
            "Snowcap",
        ],
    ),
    (
        "personal data",
        &[
            "personal data", "personal information", "pii", "user data", "email address",
            "phone number", "data collection", "tracking", "profile data", "T5",
        ],
    ),
    (
        "location",
        &["location", "geolocation", "gps", "geofenc", "geo-based", "region-based", "GH"],
    ),
    (
        "content moderation",
        &[
            "moderation", "content removal", "takedown", "harmful content", "csam",
            "report content", "NCMEC", "Redline", "Softblock",
        ],
    ),
    (
        "recommendation/personalization",
        &["recommendation", "recommend", "personaliz", "personalis", "ranking", "feed", "PF"],
    ),
    (
        "data retention",
        &["retention", "retain", "storage period", "delete after", "archiv", "DRT"],
    ),
    (
        "payments",
        &["payment", "purchase", "billing", "subscription", "checkout", "transaction"],
    ),
    (
        "biometrics",
        &["biometric", "facial", "face recognition", "fingerprint", "voiceprint", "voice print"],
    ),
];

const CATEGORY_SIGNALS: &[(&str, &[&str])] = &[
    (
        "Age Verification",
        &["age verification", "age gate", "age-gate", "verify age", "date of birth", "minimum age", "ASL"],
    ),
    (
        "Content Moderation",
        &["moderation", "content removal", "takedown", "harmful content", "csam", "Redline", "Softblock"],
    ),
    (
        "Recommendation System",
        &["recommendation", "recommend", "personaliz", "personalis", "ranking", "feed", "PF"],
    ),
    (
        "Location Services",
        &["location", "geolocation", "gps", "geofenc", "GH"],
    ),
    (
        "Data Processing",
        &["data processing", "retention", "data collection", "analytics", "tracking", "storage", "DRT", "T5"],
    ),
    (
        "Advertising",
        &["advert", "ad targeting", "targeted ads", "sponsored", "marketing"],
    ),
    (
        "Payments",
        &["payment", "purchase", "billing", "subscription", "checkout"],
    ),
];

pub const DEFAULT_CATEGORY: &str = "General Feature";

#[derive(Debug, Clone)]
struct KeywordSet {
    label: String,
    folded: Option<Regex>,
    exact: Option<Regex>,
}

impl KeywordSet {
    fn new(label: &str, keywords: &[&str]) -> Self {
        let (acronyms, words): (Vec<&str>, Vec<&str>) = keywords
            .iter()
            .copied()
            .partition(|k| k.chars().any(|c| c.is_ascii_uppercase()));
        Self {
            label: label.to_string(),
            folded: alternation(&words, r"(?i)\b(?:", ")"),
            exact: alternation(&acronyms, r"\b(?:", r")\b"),
        }
    }

    fn hits(&self, text: &str) -> usize {
        let folded = self.folded.as_ref().map_or(0, |re| re.find_iter(text).count());
        let exact = self.exact.as_ref().map_or(0, |re| re.find_iter(text).count());
        folded + exact
    }
}

fn alternation(words: &[&str], open: &str, close: &str) -> Option<Regex> {
    if words.is_empty() {
        return None;
    }
    let body = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("{open}{body}{close}")).ok()
}

/// Deterministic risk-indicator and category detection.
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    risks: Vec<KeywordSet>,
    categories: Vec<KeywordSet>,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor {
    pub fn new() -> Self {
        Self {
            risks: RISK_SIGNALS.iter().map(|(l, k)| KeywordSet::new(l, k)).collect(),
            categories: CATEGORY_SIGNALS
                .iter()
                .map(|(l, k)| KeywordSet::new(l, k))
                .collect(),
        }
    }

    /// Risk indicators present in `text`, in table order.
    pub fn risk_indicators(&self, text: &str) -> Vec<String> {
        self.risks
            .iter()
            .filter(|set| set.hits(text) > 0)
            .map(|set| set.label.clone())
            .collect()
    }

    /// Category with the most keyword hits; ties go to the earlier entry.
    pub fn category(&self, text: &str) -> Option<String> {
        let mut best: Option<(&KeywordSet, usize)> = None;
        for set in &self.categories {
            let hits = set.hits(text);
            if hits == 0 {
                continue;
            }
            if best.is_none_or(|(_, top)| hits > top) {
                best = Some((set, hits));
            }
        }
        best.map(|(set, _)| set.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_minors_and_location() {
        let s = SignalExtractor::new();
        let risks = s.risk_indicators("Curfew for teen users based on GPS location");
        assert_eq!(risks, vec!["minors", "location"]);
    }

    #[test]
    fn acronyms_are_case_sensitive() {
        let s = SignalExtractor::new();
        assert!(s.risk_indicators("uses ASL to gate").contains(&"minors".to_string()));
        assert!(s.risk_indicators("the asl value").is_empty());
    }

    #[test]
    fn prefixes_match_inflections() {
        let s = SignalExtractor::new();
        let risks = s.risk_indicators("Personalized ranking");
        assert_eq!(risks, vec!["recommendation/personalization"]);
    }

    #[test]
    fn category_picks_most_hits() {
        let s = SignalExtractor::new();
        let text = "Personalized feed ranking with a payment upsell";
        assert_eq!(s.category(text).as_deref(), Some("Recommendation System"));
    }

    #[test]
    fn no_category_signal() {
        let s = SignalExtractor::new();
        assert_eq!(s.category("Update the button colour"), None);
    }
}
