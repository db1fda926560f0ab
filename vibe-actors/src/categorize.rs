//! Keyword categorization with a versioned ruleset.
//!
//! Each category compiles to one case-insensitive alternation of its
//! keywords. Word boundaries are only anchored on keyword edges that are word
//! characters, so `c++` and `.net` still match, and whitespace inside a
//! keyword matches any run of whitespace in the text.
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vibe_common::{Result, VibeError};

/// Length of the fingerprint suffix in [`KeywordCategorizer::tag`].
const FINGERPRINT_CHARS: usize = 12;

/// Explicit category → keywords mapping. Nothing is implied; an empty map
/// categorizes every post as uncategorized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRuleset {
    pub version: String,
    pub keywords: BTreeMap<String, Vec<String>>,
}

impl CategoryRuleset {
    pub fn new(version: impl Into<String>, keywords: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            version: version.into(),
            keywords,
        }
    }

    /// Stable digest of the keyword map, independent of the declared version.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (category, keywords) in &self.keywords {
            hasher.update(category.as_bytes());
            hasher.update(&[0x1f]);
            for kw in keywords {
                hasher.update(kw.trim().to_lowercase().as_bytes());
                hasher.update(&[0x1e]);
            }
            hasher.update(&[0x1d]);
        }
        hasher.finalize().to_hex()[..FINGERPRINT_CHARS].to_string()
    }
}

#[derive(Debug, Clone)]
struct CompiledCategory {
    name: String,
    pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct KeywordCategorizer {
    ruleset: CategoryRuleset,
    compiled: Vec<CompiledCategory>,
    tag: String,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn keyword_pattern(keyword: &str) -> Option<String> {
    let keyword = keyword.trim();
    let first = keyword.chars().next()?;
    let last = keyword.chars().next_back()?;

    let body = keyword
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");

    let mut pattern = String::with_capacity(body.len() + 4);
    if is_word_char(first) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&body);
    if is_word_char(last) {
        pattern.push_str(r"\b");
    }
    Some(pattern)
}

impl KeywordCategorizer {
    pub fn new(ruleset: CategoryRuleset) -> Result<Self> {
        let mut compiled = Vec::with_capacity(ruleset.keywords.len());
        for (name, keywords) in &ruleset.keywords {
            if name.trim().is_empty() {
                return Err(VibeError::Config("category names must not be empty".into()));
            }
            let alternatives: Vec<String> = keywords.iter().filter_map(|k| keyword_pattern(k)).collect();
            if alternatives.is_empty() {
                tracing::warn!(category = %name, "categorize.no_keywords");
                continue;
            }
            let pattern = RegexBuilder::new(&format!("(?:{})", alternatives.join("|")))
                .case_insensitive(true)
                .build()
                .map_err(|e| VibeError::Config(format!("category {name:?}: {e}")))?;
            compiled.push(CompiledCategory {
                name: name.clone(),
                pattern,
            });
        }
        let tag = format!("{}+{}", ruleset.version, ruleset.fingerprint());
        tracing::debug!(categories = compiled.len(), %tag, "categorize.compiled");
        Ok(Self {
            ruleset,
            compiled,
            tag,
        })
    }

    /// Sorted, de-duplicated categories whose keywords occur in `text`.
    pub fn categorize(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        // BTreeMap iteration already yields names in order and without repeats.
        self.compiled
            .iter()
            .filter(|c| c.pattern.is_match(text))
            .map(|c| c.name.clone())
            .collect()
    }

    /// `"{version}+{fingerprint}"`, recorded on every post this categorizer tagged.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn version(&self) -> &str {
        &self.ruleset.version
    }

    /// Every configured category, including ones without usable keywords.
    pub fn categories(&self) -> Vec<String> {
        self.ruleset.keywords.keys().cloned().collect()
    }

    pub fn is_known(&self, category: &str) -> bool {
        self.ruleset.keywords.contains_key(category)
    }

    /// Keep only configured categories, sorted and de-duplicated.
    pub fn retain_known<I, S>(&self, categories: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = categories
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| self.is_known(c))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
