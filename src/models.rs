//! Core data models used throughout Trendwatch.
//!
//! These types represent the raw and normalized signals that flow through
//! the ingestion pipeline, plus the per-cycle summary handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of external source a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Version releases (GitHub releases API).
    Release,
    /// Official blogs and announcement feeds (RSS/Atom).
    Blog,
    /// Community discussion (Hacker News).
    Forum,
    /// Paper feeds (arXiv RSS).
    Paper,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Release => "release",
            SourceType::Blog => "blog",
            SourceType::Forum => "forum",
            SourceType::Paper => "paper",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(SourceType::Release),
            "blog" => Ok(SourceType::Blog),
            "forum" => Ok(SourceType::Forum),
            "paper" => Ok(SourceType::Paper),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

/// Raw item produced by an adapter before normalization.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub source_type: SourceType,
    /// Human label of origin (e.g. `"LangChain GitHub"`, `"arXiv cs.AI"`).
    pub source_name: String,
    pub title: String,
    pub url: String,
    /// Body or summary text, HTML-stripped and truncated by the adapter.
    pub body_excerpt: String,
    pub published_at: DateTime<Utc>,
    /// Source-native metric (stars, points). Absent for paper/blog feeds.
    pub popularity_signal: Option<i64>,
    /// Category hint carried by the feed configuration (blogs only).
    pub category_hint: Option<String>,
    /// Adapter-specific extras (version tag, repo, comment count).
    pub extra: serde_json::Value,
}

/// Normalized, classified, scored signal persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Content-addressed id: truncated sha256 of the canonical URL.
    pub id: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub title: String,
    pub body_excerpt: String,
    /// Canonical form of the original URL.
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub popularity_signal: Option<i64>,
    /// Matched category tags, highest-priority first. Never empty:
    /// records matching no lexicon carry the generic `"other"` tag.
    pub categories: Vec<String>,
    pub is_breaking_change: bool,
    /// Weighted score in [0, 100], fixed at ingestion time.
    pub score: f64,
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl Record {
    /// Primary category used for scoring and grouping.
    pub fn primary_category(&self) -> &str {
        self.categories
            .first()
            .map(String::as_str)
            .unwrap_or("other")
    }

    /// Text handed to the embedding provider for this record.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.body_excerpt)
    }
}

/// Context snippet returned by the retrieval index for a query.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnippet {
    pub record_id: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    pub body_excerpt: String,
    /// Cosine similarity against the query embedding, in [-1, 1].
    pub similarity: f64,
}

/// Per-adapter fetch result within a cycle summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub adapter: String,
    pub fetched: usize,
    /// Failure marker when the adapter hit a network/parse error.
    /// Partial data fetched before the failure is still counted above.
    pub failure: Option<String>,
}

/// Outcome of one ingestion cycle. Always produced, even when every
/// source failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub cycle_start: Option<DateTime<Utc>>,
    pub sources: Vec<SourceReport>,
    pub fetched: usize,
    /// Dropped as duplicates (intra-batch or already persisted).
    pub deduplicated: usize,
    /// Dropped by pre-score admission gates or malformed input.
    pub rejected: usize,
    /// Admitted to the rolling window and index.
    pub admitted: usize,
    /// Archived but below the score threshold (never windowed/indexed).
    pub archived_only: usize,
    pub indexed: usize,
    /// Embedding failures deferred to a later cycle.
    pub index_pending: usize,
    pub breaking_changes: usize,
}

impl CycleSummary {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.failure.is_some())
    }
}
