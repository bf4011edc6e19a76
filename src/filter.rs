//! Admission gates.
//!
//! Two independent layers: pre-score gates drop clearly-invalid or
//! below-floor records before any scoring work happens; the post-score
//! threshold decides whether a scored record enters the window and index.
//! Sub-threshold records are still archived (archive-always policy).

use chrono::{DateTime, Duration, Utc};

use crate::config::ThresholdsConfig;
use crate::models::{RawRecord, SourceType};

/// Tolerance for clock skew on `published_at`; anything further in the
/// future than this is treated as malformed.
const FUTURE_TOLERANCE_HOURS: i64 = 1;

/// Why a record was rejected before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyTitle,
    EmptyUrl,
    FuturePublished,
    BelowForumFloor,
}

/// Pre-score admission gate. `Ok(())` admits the record into the scoring
/// stages; `Err` names the gate that dropped it.
pub fn admit_pre_score(
    record: &RawRecord,
    thresholds: &ThresholdsConfig,
    now: DateTime<Utc>,
) -> Result<(), Rejection> {
    if record.title.trim().is_empty() {
        return Err(Rejection::EmptyTitle);
    }
    if record.url.trim().is_empty() {
        return Err(Rejection::EmptyUrl);
    }
    if record.published_at > now + Duration::hours(FUTURE_TOLERANCE_HOURS) {
        return Err(Rejection::FuturePublished);
    }
    if record.source_type == SourceType::Forum {
        let points = record.popularity_signal.unwrap_or(0);
        if points < thresholds.forum_min_points {
            return Err(Rejection::BelowForumFloor);
        }
    }
    Ok(())
}

/// Post-score threshold: whether a scored record is admitted to the rolling
/// window and the retrieval index. Records failing this gate are archived
/// only.
pub fn admit_post_score(score: f64, thresholds: &ThresholdsConfig) -> bool {
    score >= thresholds.score_min
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(source_type: SourceType, title: &str, url: &str, points: Option<i64>) -> RawRecord {
        RawRecord {
            source_type,
            source_name: "test".to_string(),
            title: title.to_string(),
            url: url.to_string(),
            body_excerpt: String::new(),
            published_at: Utc::now(),
            popularity_signal: points,
            category_hint: None,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_empty_title_rejected() {
        let r = raw(SourceType::Blog, "  ", "https://a.com", None);
        assert_eq!(
            admit_pre_score(&r, &ThresholdsConfig::default(), Utc::now()),
            Err(Rejection::EmptyTitle)
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        let r = raw(SourceType::Blog, "t", "", None);
        assert_eq!(
            admit_pre_score(&r, &ThresholdsConfig::default(), Utc::now()),
            Err(Rejection::EmptyUrl)
        );
    }

    #[test]
    fn test_future_published_rejected_beyond_tolerance() {
        let now = Utc::now();
        let mut r = raw(SourceType::Blog, "t", "https://a.com", None);

        r.published_at = now + Duration::minutes(30);
        assert!(admit_pre_score(&r, &ThresholdsConfig::default(), now).is_ok());

        r.published_at = now + Duration::hours(2);
        assert_eq!(
            admit_pre_score(&r, &ThresholdsConfig::default(), now),
            Err(Rejection::FuturePublished)
        );
    }

    #[test]
    fn test_forum_floor_applies_regardless_of_score() {
        let thresholds = ThresholdsConfig::default();
        let r = raw(SourceType::Forum, "t", "https://a.com", Some(10));
        assert_eq!(
            admit_pre_score(&r, &thresholds, Utc::now()),
            Err(Rejection::BelowForumFloor)
        );

        let r = raw(SourceType::Forum, "t", "https://a.com", Some(50));
        assert!(admit_pre_score(&r, &thresholds, Utc::now()).is_ok());

        // Absent signal on a forum post counts as zero.
        let r = raw(SourceType::Forum, "t", "https://a.com", None);
        assert_eq!(
            admit_pre_score(&r, &thresholds, Utc::now()),
            Err(Rejection::BelowForumFloor)
        );
    }

    #[test]
    fn test_floor_does_not_apply_to_other_sources() {
        let thresholds = ThresholdsConfig::default();
        let r = raw(SourceType::Release, "t", "https://a.com", Some(0));
        assert!(admit_pre_score(&r, &thresholds, Utc::now()).is_ok());
    }

    #[test]
    fn test_post_score_threshold() {
        let thresholds = ThresholdsConfig::default();
        assert!(admit_post_score(30.0, &thresholds));
        assert!(admit_post_score(77.0, &thresholds));
        assert!(!admit_post_score(29.9, &thresholds));
    }
}
