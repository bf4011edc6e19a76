//! Ingestion cycle orchestration.
//!
//! One cycle: fetch all adapters concurrently → merge → dedupe → gate →
//! classify → score → threshold → commit → index. Adapter and validation
//! failures are absorbed into the cycle summary; only a persistence failure
//! aborts the cycle, and the transactional commit guarantees a clean retry.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::adapter::{AdapterRegistry, FetchOutcome};
use crate::classify::Classifier;
use crate::config::Config;
use crate::error::CycleError;
use crate::filter;
use crate::index;
use crate::models::{CycleSummary, RawRecord, Record, SourceReport};
use crate::normalize;
use crate::score::{ScoreInput, Scorer};
use crate::store;

/// Sequential-stage output, split by the post-score threshold.
pub struct ProcessedBatch {
    pub admitted: Vec<Record>,
    pub archived_only: Vec<Record>,
    pub deduplicated: usize,
    pub rejected: usize,
}

/// Run the full ingestion cycle against the given pool.
///
/// `cycle_start` is the explicit clock for the whole cycle: the fetch
/// window is computed from the persisted last-run checkpoint (cold start
/// falls back to `cycle_start − cold_start_days`), recency scoring uses it
/// as `now`, and the store persists it as the next checkpoint.
pub async fn run_cycle(
    config: &Config,
    pool: &SqlitePool,
    cycle_start: DateTime<Utc>,
) -> Result<CycleSummary, CycleError> {
    let window_start = match store::last_run(pool).await? {
        Some(ts) => ts,
        None => {
            let fallback =
                cycle_start - chrono::Duration::days(config.ingest.cold_start_days);
            info!(
                days = config.ingest.cold_start_days,
                "cold start, fetching recent window"
            );
            fallback
        }
    };

    let (candidates, sources) = fetch_all(config, window_start).await;

    let mut summary = CycleSummary {
        cycle_start: Some(cycle_start),
        fetched: candidates.len(),
        sources,
        ..Default::default()
    };

    let seen = store::seen_ids(pool).await?;
    let batch = process_batch(config, candidates, &seen, cycle_start);

    summary.deduplicated = batch.deduplicated;
    summary.rejected = batch.rejected;
    summary.admitted = batch.admitted.len();
    summary.archived_only = batch.archived_only.len();
    summary.breaking_changes = batch
        .admitted
        .iter()
        .chain(batch.archived_only.iter())
        .filter(|r| r.is_breaking_change)
        .count();

    store::commit_cycle(
        pool,
        &batch.admitted,
        &batch.archived_only,
        cycle_start,
        config.ingest.keep_days,
        config.ingest.force_update,
    )
    .await?;

    // Indexing runs after commit so queries only ever see records the
    // store owns; embedding trouble defers entries, never fails the cycle.
    let index_stats = index::index_records(pool, &config.embedding, &batch.admitted).await;
    summary.indexed = index_stats.indexed;
    summary.index_pending = index_stats.pending;

    info!(
        fetched = summary.fetched,
        admitted = summary.admitted,
        archived_only = summary.archived_only,
        indexed = summary.indexed,
        "cycle complete"
    );

    Ok(summary)
}

/// Fetch from every enabled adapter concurrently.
///
/// Each adapter runs as its own task under an overall budget; a slow or
/// failing adapter is reported in its source report and never blocks the
/// others.
async fn fetch_all(
    config: &Config,
    window_start: DateTime<Utc>,
) -> (Vec<RawRecord>, Vec<SourceReport>) {
    let registry = AdapterRegistry::from_config(config);
    if registry.is_empty() {
        warn!("no sources configured");
        return (Vec::new(), Vec::new());
    }

    let budget = Duration::from_secs(config.ingest.adapter_budget_secs);
    let mut tasks: JoinSet<(String, FetchOutcome)> = JoinSet::new();

    for adapter in registry.into_adapters() {
        tasks.spawn(async move {
            let name = adapter.name().to_string();
            let outcome = match tokio::time::timeout(budget, adapter.fetch(window_start)).await
            {
                Ok(outcome) => outcome,
                Err(_) => FetchOutcome::failed(
                    Vec::new(),
                    format!("timed out after {}s", budget.as_secs()),
                ),
            };
            (name, outcome)
        });
    }

    let mut candidates = Vec::new();
    let mut sources = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, outcome)) => {
                if let Some(ref failure) = outcome.failure {
                    warn!(adapter = %name, failure, "adapter reported failure");
                }
                sources.push(SourceReport {
                    adapter: name,
                    fetched: outcome.records.len(),
                    failure: outcome.failure,
                });
                candidates.extend(outcome.records);
            }
            Err(e) => {
                // A panicked adapter task is isolated like any other failure.
                warn!(error = %e, "adapter task aborted");
                sources.push(SourceReport {
                    adapter: "unknown".to_string(),
                    fetched: 0,
                    failure: Some(e.to_string()),
                });
            }
        }
    }

    sources.sort_by(|a, b| a.adapter.cmp(&b.adapter));
    (candidates, sources)
}

/// The sequential stages: dedupe → gates → classify → score → threshold.
///
/// Pure with respect to `cycle_start`: identical inputs and clock produce
/// identical output, so a retried cycle re-derives the same records.
pub fn process_batch(
    config: &Config,
    candidates: Vec<RawRecord>,
    already_seen: &HashSet<String>,
    cycle_start: DateTime<Utc>,
) -> ProcessedBatch {
    let outcome = normalize::dedupe(candidates, already_seen, config.ingest.force_update);
    let classifier = Classifier::new(&config.lexicon);
    let scorer = Scorer::new(config.scoring.clone());

    let mut admitted = Vec::new();
    let mut archived_only = Vec::new();
    let mut rejected = 0usize;

    for (id, raw) in outcome.accepted {
        if filter::admit_pre_score(&raw, &config.thresholds, cycle_start).is_err() {
            rejected += 1;
            continue;
        }

        let classification = classifier.classify(&raw);
        let score = scorer.score(
            &ScoreInput {
                source_type: raw.source_type,
                primary_category: classification
                    .categories
                    .first()
                    .map(String::as_str)
                    .unwrap_or("other"),
                popularity_signal: raw.popularity_signal,
                published_at: raw.published_at,
                is_breaking_change: classification.is_breaking_change,
            },
            cycle_start,
        );

        let record = Record {
            id,
            source_type: raw.source_type,
            source_name: raw.source_name,
            title: raw.title,
            body_excerpt: raw.body_excerpt,
            url: normalize::canonical_url(&raw.url),
            published_at: raw.published_at,
            popularity_signal: raw.popularity_signal,
            categories: classification.categories,
            is_breaking_change: classification.is_breaking_change,
            score,
            extra: raw.extra,
        };

        if filter::admit_post_score(score, &config.thresholds) {
            admitted.push(record);
        } else {
            archived_only.push(record);
        }
    }

    ProcessedBatch {
        admitted,
        archived_only,
        deduplicated: outcome.rejected,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use chrono::Duration as ChronoDuration;

    fn test_config() -> Config {
        let toml = r#"
[db]
path = "data/tw.sqlite"

[lexicon]
framework = ["langchain"]
llm = ["claude", "gpt"]
"#;
        toml::from_str(toml).unwrap()
    }

    fn raw(
        source_type: SourceType,
        title: &str,
        url: &str,
        popularity: Option<i64>,
        age_hours: i64,
        now: DateTime<Utc>,
    ) -> RawRecord {
        RawRecord {
            source_type,
            source_name: "test".to_string(),
            title: title.to_string(),
            url: url.to_string(),
            body_excerpt: String::new(),
            published_at: now - ChronoDuration::hours(age_hours),
            popularity_signal: popularity,
            category_hint: None,
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_release_scenario_admitted_at_77() {
        let config = test_config();
        let now = Utc::now();
        let batch = process_batch(
            &config,
            vec![raw(
                SourceType::Release,
                "[LangChain] v0.3.0",
                "https://github.com/langchain-ai/langchain/releases/tag/v0.3.0",
                None,
                1,
                now,
            )],
            &HashSet::new(),
            now,
        );
        assert_eq!(batch.admitted.len(), 1);
        assert_eq!(batch.admitted[0].score, 77.0);
        assert_eq!(batch.admitted[0].primary_category(), "framework");
    }

    #[test]
    fn test_forum_below_floor_rejected_pre_score() {
        let config = test_config();
        let now = Utc::now();
        let batch = process_batch(
            &config,
            vec![raw(
                SourceType::Forum,
                "High-scoring title about claude",
                "https://news.ycombinator.com/item?id=1",
                Some(10),
                1,
                now,
            )],
            &HashSet::new(),
            now,
        );
        assert!(batch.admitted.is_empty());
        assert!(batch.archived_only.is_empty());
        assert_eq!(batch.rejected, 1);
    }

    #[test]
    fn test_sub_threshold_is_archived_only() {
        let config = test_config();
        let now = Utc::now();
        // Old unmatched forum post at the floor: 18 + 8 + 2.5 + 2 = 30.5
        // — nudge it below threshold with an even weaker score via config.
        let mut config_low = config.clone();
        config_low.thresholds.score_min = 40.0;
        let batch = process_batch(
            &config_low,
            vec![raw(
                SourceType::Forum,
                "Some unrelated story",
                "https://example.com/story",
                Some(50),
                2_000,
                now,
            )],
            &HashSet::new(),
            now,
        );
        assert!(batch.admitted.is_empty());
        assert_eq!(batch.archived_only.len(), 1);
    }

    #[test]
    fn test_duplicate_urls_collapse() {
        let config = test_config();
        let now = Utc::now();
        let batch = process_batch(
            &config,
            vec![
                raw(SourceType::Blog, "A", "https://a.com/post", None, 1, now),
                raw(SourceType::Blog, "A again", "http://A.com/post/", None, 1, now),
            ],
            &HashSet::new(),
            now,
        );
        assert_eq!(batch.admitted.len(), 1);
        assert_eq!(batch.deduplicated, 1);
    }

    #[test]
    fn test_record_url_is_canonicalized() {
        let config = test_config();
        let now = Utc::now();
        let batch = process_batch(
            &config,
            vec![raw(
                SourceType::Blog,
                "T",
                "http://Example.com/post/?utm_source=rss",
                None,
                1,
                now,
            )],
            &HashSet::new(),
            now,
        );
        assert_eq!(batch.admitted[0].url, "https://example.com/post");
    }

    #[test]
    fn test_breaking_change_counted_and_scored() {
        let config = test_config();
        let now = Utc::now();
        let batch = process_batch(
            &config,
            vec![raw(
                SourceType::Release,
                "[LangChain] v1.0: breaking change in agents",
                "https://github.com/langchain-ai/langchain/releases/tag/v1.0",
                None,
                1,
                now,
            )],
            &HashSet::new(),
            now,
        );
        assert!(batch.admitted[0].is_breaking_change);
        assert_eq!(batch.admitted[0].score, 92.0); // 77 + 15
    }
}
