//! Known-jurisdiction vocabulary.
//!
//! Maps free text onto canonical jurisdiction names. Each jurisdiction has
//! case-insensitive aliases ("European Union", "Europe", "GDPR") and
//! case-sensitive abbreviations ("EU", "UT"). Matching is whole-word, so
//! "CA" matches in "launch in CA" but not in "CAPTCHA", and "us" the
//! pronoun never matches "United States".
//!
//! Jurisdictions served by discovered search tools are added at runtime with
//! [`JurisdictionVocabulary::add`].

use regex::Regex;

struct Builtin {
    canonical: &'static str,
    aliases: &'static [&'static str],
    abbreviations: &'static [&'static str],
}

const BUILTIN: &[Builtin] = &[
    Builtin {
        canonical: "European Union",
        aliases: &["European Union", "Europe", "GDPR", "Digital Services Act", "DSA"],
        abbreviations: &["EU", "EEA"],
    },
    Builtin {
        canonical: "United States",
        aliases: &[
            "United States",
            "United States of America",
            "USA",
            "US federal",
            "U.S. federal",
            "NCMEC",
            "COPPA",
        ],
        abbreviations: &["US", "U.S."],
    },
    Builtin {
        canonical: "California",
        aliases: &["California", "CCPA", "CPRA", "SB976"],
        abbreviations: &["CA"],
    },
    Builtin {
        canonical: "Utah",
        aliases: &["Utah"],
        abbreviations: &["UT"],
    },
    Builtin {
        canonical: "Florida",
        aliases: &["Florida"],
        abbreviations: &["FL"],
    },
    Builtin {
        canonical: "Texas",
        aliases: &["Texas"],
        abbreviations: &["TX"],
    },
    Builtin {
        canonical: "Brazil",
        aliases: &["Brazil", "Brasil", "LGPD"],
        abbreviations: &["BR"],
    },
    Builtin {
        canonical: "United Kingdom",
        aliases: &["United Kingdom", "Britain", "Great Britain", "England"],
        abbreviations: &["UK"],
    },
    Builtin {
        canonical: "Canada",
        aliases: &["Canada", "PIPEDA"],
        abbreviations: &[],
    },
    Builtin {
        canonical: "Australia",
        aliases: &["Australia"],
        abbreviations: &["AU"],
    },
    Builtin {
        canonical: "Singapore",
        aliases: &["Singapore", "PDPA"],
        abbreviations: &["SG"],
    },
    Builtin {
        canonical: "India",
        aliases: &["India", "DPDP"],
        abbreviations: &[],
    },
    Builtin {
        canonical: "Japan",
        aliases: &["Japan", "APPI"],
        abbreviations: &["JP"],
    },
    Builtin {
        canonical: "South Korea",
        aliases: &["South Korea", "Korea", "PIPA"],
        abbreviations: &["KR"],
    },
    Builtin {
        canonical: "China",
        aliases: &["China", "PIPL"],
        abbreviations: &["PRC"],
    },
];

/// Region words that name no particular jurisdiction.
pub const GENERIC_REGIONS: &[&str] = &[
    "global",
    "globally",
    "worldwide",
    "all regions",
    "international",
    "everywhere",
    "all markets",
    "all countries",
];

/// Whether `region` is a generic placeholder rather than a jurisdiction.
pub fn is_generic_region(region: &str) -> bool {
    let lower = region.trim().to_lowercase();
    GENERIC_REGIONS.contains(&lower.as_str()) || lower.starts_with("global")
}

#[derive(Debug, Clone)]
struct Entry {
    canonical: String,
    aliases: Vec<String>,
    abbreviations: Vec<String>,
    alias_re: Option<Regex>,
    abbr_re: Option<Regex>,
}

impl Entry {
    fn new(canonical: &str, aliases: &[&str], abbreviations: &[&str]) -> Self {
        let mut aliases: Vec<String> = aliases.iter().map(|s| s.to_string()).collect();
        if !aliases.iter().any(|a| a.eq_ignore_ascii_case(canonical)) {
            aliases.insert(0, canonical.to_string());
        }
        let abbreviations: Vec<String> = abbreviations.iter().map(|s| s.to_string()).collect();
        let alias_re = word_pattern(&aliases, true);
        let abbr_re = word_pattern(&abbreviations, false);
        Self {
            canonical: canonical.to_string(),
            aliases,
            abbreviations,
            alias_re,
            abbr_re,
        }
    }

    fn matches_exact(&self, text: &str) -> bool {
        self.aliases.iter().any(|a| a.eq_ignore_ascii_case(text))
            || self.abbreviations.iter().any(|a| a == text)
            || self.abbreviations.iter().any(|a| a.eq_ignore_ascii_case(text) && a.len() > 3)
    }

    /// Byte offset of the earliest whole-word mention in `text`.
    fn first_mention(&self, text: &str) -> Option<usize> {
        let alias_pos = self.alias_re.as_ref().and_then(|re| re.find(text)).map(|m| m.start());
        let abbr_pos = self.abbr_re.as_ref().and_then(|re| re.find(text)).map(|m| m.start());
        match (alias_pos, abbr_pos) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Whole-word alternation over `words`, optionally case-insensitive.
///
/// Boundaries are explicit non-word groups rather than `\b` because
/// alternatives may end in punctuation (`U.S.`).
fn word_pattern(words: &[String], case_insensitive: bool) -> Option<Regex> {
    if words.is_empty() {
        return None;
    }
    let alternation = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!(r"{flags}(?:^|[^\w])(?:{alternation})(?:$|[^\w])")).ok()
}

/// Canonical jurisdiction names with their aliases and abbreviations.
#[derive(Debug, Clone)]
pub struct JurisdictionVocabulary {
    entries: Vec<Entry>,
}

impl Default for JurisdictionVocabulary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl JurisdictionVocabulary {
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|b| Entry::new(b.canonical, b.aliases, b.abbreviations))
            .collect();
        Self { entries }
    }

    /// Register a jurisdiction (e.g. one served by a discovered tool).
    ///
    /// Names that already resolve to a known jurisdiction are ignored.
    /// Returns the canonical name the input resolves to.
    pub fn add(&mut self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() || is_generic_region(name) {
            return None;
        }
        if let Some(existing) = self.canonicalize(name) {
            return Some(existing);
        }
        self.entries.push(Entry::new(name, &[], &[]));
        Some(name.to_string())
    }

    /// Resolve a single region string to its canonical name.
    ///
    /// Tries an exact alias/abbreviation match first, then a whole-word
    /// mention inside the string ("State of Utah" → Utah).
    pub fn canonicalize(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(entry) = self.entries.iter().find(|e| e.matches_exact(text)) {
            return Some(entry.canonical.clone());
        }
        self.find_all(text).into_iter().next()
    }

    pub fn is_known(&self, region: &str) -> bool {
        self.canonicalize(region).is_some()
    }

    /// All jurisdictions mentioned in `text`, ordered by first mention.
    pub fn find_all(&self, text: &str) -> Vec<String> {
        let mut hits: Vec<(usize, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(idx, e)| e.first_mention(text).map(|pos| (pos, idx)))
            .collect();
        hits.sort();
        hits.into_iter()
            .map(|(_, idx)| self.entries[idx].canonical.clone())
            .collect()
    }

    pub fn canonical_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.canonical.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
