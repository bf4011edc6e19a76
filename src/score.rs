//! Four-factor weighted scorer.
//!
//! `score = authority(30) + category(25) + popularity(25) + recency(20)`,
//! plus a flat +15 for breaking changes, clamped to 100. All factors are
//! deterministic given the record and an explicit `now` (the cycle start),
//! so a score is never silently recomputed after persistence.

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::SourceType;

pub const BREAKING_CHANGE_BONUS: f64 = 15.0;

/// Neutral popularity when a source carries no usable signal.
const NEUTRAL_POPULARITY: f64 = 10.0;

/// Scoring input, decoupled from [`Record`](crate::models::Record) because
/// scoring runs before the record is assembled.
pub struct ScoreInput<'a> {
    pub source_type: SourceType,
    pub primary_category: &'a str,
    pub popularity_signal: Option<i64>,
    pub published_at: DateTime<Utc>,
    pub is_breaking_change: bool,
}

pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Compute the weighted score in [0, 100].
    pub fn score(&self, input: &ScoreInput<'_>, now: DateTime<Utc>) -> f64 {
        let total = self.authority(input.source_type)
            + self.category_value(input.primary_category)
            + popularity(input.source_type, input.popularity_signal)
            + recency(input.published_at, now)
            + if input.is_breaking_change {
                BREAKING_CHANGE_BONUS
            } else {
                0.0
            };

        ((total.min(100.0)) * 10.0).round() / 10.0
    }

    /// Authority sub-score in [0, 30], keyed by source type. Official blogs
    /// outrank releases, releases outrank papers, papers outrank forums.
    fn authority(&self, source_type: SourceType) -> f64 {
        if let Some(v) = self.config.authority.get(source_type.as_str()) {
            return v.clamp(0.0, 30.0);
        }
        match source_type {
            SourceType::Blog => 30.0,
            SourceType::Release => 25.0,
            SourceType::Paper => 22.0,
            SourceType::Forum => 18.0,
        }
    }

    /// Category sub-score in [0, 25], keyed by the primary matched category.
    fn category_value(&self, category: &str) -> f64 {
        if let Some(v) = self.config.category.get(category) {
            return v.clamp(0.0, 25.0);
        }
        match category {
            "llm" => 25.0,
            "framework" => 22.0,
            "paper" => 20.0,
            "rag" | "agent" => 18.0,
            "workflow" => 15.0,
            _ => 8.0,
        }
    }
}

/// Popularity sub-score in [0, 25], normalized against a source-specific
/// scale. An absent (or zero-star) signal maps to a neutral default.
fn popularity(source_type: SourceType, signal: Option<i64>) -> f64 {
    match source_type {
        SourceType::Forum => match signal {
            Some(points) => ((points as f64) / 500.0 * 25.0).min(25.0).max(0.0),
            None => NEUTRAL_POPULARITY,
        },
        SourceType::Release => match signal {
            Some(stars) if stars > 0 => ((stars as f64) / 100_000.0 * 25.0).min(25.0),
            _ => NEUTRAL_POPULARITY,
        },
        SourceType::Paper => match signal {
            Some(stars) if stars > 0 => ((stars as f64) / 1_000.0 * 25.0).min(25.0),
            _ => NEUTRAL_POPULARITY,
        },
        SourceType::Blog => NEUTRAL_POPULARITY,
    }
}

/// Recency sub-score in [2, 20]: monotonic step decay over `now - published_at`.
fn recency(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - published_at).num_seconds() as f64 / 3600.0;
    if hours <= 24.0 {
        20.0
    } else if hours <= 48.0 {
        15.0
    } else if hours <= 168.0 {
        10.0
    } else if hours <= 720.0 {
        5.0
    } else {
        2.0
    }
}
