//! Keyword classifier and breaking-change detection.
//!
//! Category tagging matches configurable per-category lexicons against the
//! record's title and excerpt. Matching is non-exclusive: a record may carry
//! several tags, ordered by a fixed priority, and zero lexicon hits leaves it
//! with the generic `other` tag. Deterministic and stateless.

use std::collections::BTreeMap;

use crate::models::{RawRecord, SourceType};

/// Category priority, highest first. The first matched entry becomes the
/// record's primary category for scoring and grouping.
pub const CATEGORY_PRIORITY: &[&str] = &["framework", "llm", "rag", "agent", "workflow"];

/// Phrases that signal an incompatible change. Matched case-insensitively
/// against title + excerpt.
const BREAKING_LEXICON: &[&str] = &[
    "breaking change",
    "breaking:",
    "breaking -",
    "deprecated",
    "deprecation",
    "removed in",
    "removal of",
    "migration guide",
    "migration required",
    "incompatible",
    "backward incompatible",
    "no longer supported",
];

pub struct Classifier {
    /// Per-category keyword lists, lowercased at construction.
    lexicon: BTreeMap<String, Vec<String>>,
}

/// Classification output for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Matched tags, highest-priority first. Never empty.
    pub categories: Vec<String>,
    pub is_breaking_change: bool,
}

impl Classifier {
    pub fn new(lexicon: &BTreeMap<String, Vec<String>>) -> Self {
        let lexicon = lexicon
            .iter()
            .map(|(cat, words)| {
                (
                    cat.to_lowercase(),
                    words.iter().map(|w| w.to_lowercase()).collect(),
                )
            })
            .collect();
        Self { lexicon }
    }

    /// Classify a raw record into category tags and a breaking-change flag.
    pub fn classify(&self, record: &RawRecord) -> Classification {
        let text = format!("{} {}", record.title, record.body_excerpt).to_lowercase();

        let mut categories: Vec<String> = Vec::new();

        // Paper feeds keep their source-level category as primary.
        if record.source_type == SourceType::Paper {
            categories.push("paper".to_string());
        }

        for cat in CATEGORY_PRIORITY {
            if let Some(words) = self.lexicon.get(*cat) {
                if words.iter().any(|w| !w.is_empty() && text.contains(w.as_str())) {
                    categories.push(cat.to_string());
                }
            }
        }

        // A feed-level hint counts when the lexicons found nothing better.
        if categories.is_empty() {
            if let Some(hint) = record
                .category_hint
                .as_deref()
                .map(str::to_lowercase)
                .filter(|h| !h.is_empty() && h != "other")
            {
                categories.push(hint);
            }
        }

        if categories.is_empty() {
            categories.push("other".to_string());
        }

        Classification {
            categories,
            is_breaking_change: BREAKING_LEXICON.iter().any(|kw| text.contains(kw)),
        }
    }
}
