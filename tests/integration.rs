//! End-to-end tests over the persisted store and index: dedup across runs,
//! window pruning, archive bucketing, upsert policy, and retrieval
//! consistency. Network-backed adapters and embedding providers are not
//! exercised here — the pipeline stages are driven with synthetic records
//! and vectors.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use trendwatch::config::Config;
use trendwatch::error::QueryError;
use trendwatch::models::{RawRecord, Record, SourceType};
use trendwatch::{index, migrate, normalize, pipeline, store};

fn test_config(root: &Path) -> Config {
    let toml = format!(
        r#"
[db]
path = "{}/tw.sqlite"

[lexicon]
framework = ["langchain"]
llm = ["claude", "gpt"]
"#,
        root.display()
    );
    toml::from_str(&toml).unwrap()
}

async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool = trendwatch::db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, config, pool)
}

fn raw(title: &str, url: &str, published_at: DateTime<Utc>) -> RawRecord {
    RawRecord {
        source_type: SourceType::Blog,
        source_name: "Test Blog".to_string(),
        title: title.to_string(),
        url: url.to_string(),
        body_excerpt: "Claude-related announcement body.".to_string(),
        published_at,
        popularity_signal: None,
        category_hint: None,
        extra: serde_json::Value::Null,
    }
}

fn record(id_url: &str, title: &str, published_at: DateTime<Utc>, score: f64) -> Record {
    Record {
        id: normalize::record_id(id_url),
        source_type: SourceType::Blog,
        source_name: "Test Blog".to_string(),
        title: title.to_string(),
        body_excerpt: "body".to_string(),
        url: normalize::canonical_url(id_url),
        published_at,
        popularity_signal: None,
        categories: vec!["llm".to_string()],
        is_breaking_change: false,
        score,
        extra: serde_json::Value::Null,
    }
}

async fn commit(
    pool: &SqlitePool,
    config: &Config,
    admitted: &[Record],
    archived_only: &[Record],
    cycle_start: DateTime<Utc>,
) {
    store::commit_cycle(
        pool,
        admitted,
        archived_only,
        cycle_start,
        config.ingest.keep_days,
        config.ingest.force_update,
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_ingestion_is_idempotent_across_runs() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let candidates = vec![
        raw("Claude update", "https://blog.example.com/claude-update", now),
        raw("Other post", "https://blog.example.com/other", now),
    ];

    // First cycle
    let seen = store::seen_ids(&pool).await.unwrap();
    let batch = pipeline::process_batch(&config, candidates.clone(), &seen, now);
    assert_eq!(batch.admitted.len(), 2);
    commit(&pool, &config, &batch.admitted, &batch.archived_only, now).await;

    // Second cycle over the same fetch window: everything deduped.
    let seen = store::seen_ids(&pool).await.unwrap();
    let batch = pipeline::process_batch(&config, candidates, &seen, now);
    assert_eq!(batch.admitted.len(), 0);
    assert_eq!(batch.deduplicated, 2);
    assert_eq!(store::window(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_window_never_holds_stale_records() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let fresh = record("https://a.com/fresh", "Fresh", now - Duration::days(2), 70.0);
    let stale = record("https://a.com/stale", "Stale", now - Duration::days(45), 70.0);
    commit(&pool, &config, &[fresh, stale], &[], now).await;

    let window = store::window(&pool).await.unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].title, "Fresh");

    let cutoff = now - Duration::days(config.ingest.keep_days);
    assert!(window.iter().all(|r| r.published_at >= cutoff));

    // The stale record still reached its archive bucket.
    let bucket = store::bucket_key(now - Duration::days(45));
    let archived = store::archive_bucket(&pool, &bucket).await.unwrap();
    assert_eq!(archived.len(), 1);
}

#[tokio::test]
async fn test_late_old_record_files_into_publish_month() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let old_publish = Utc.with_ymd_and_hms(2024, 11, 15, 10, 0, 0).unwrap();
    let late = record("https://a.com/late", "Late arrival", old_publish, 50.0);
    commit(&pool, &config, &[], &[late], now).await;

    let archived = store::archive_bucket(&pool, "2024-11").await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].title, "Late arrival");

    // Not in the ingestion month's bucket.
    let current = store::archive_bucket(&pool, &store::bucket_key(now)).await.unwrap();
    assert!(current.is_empty());
}

#[tokio::test]
async fn test_upsert_refreshes_metadata_but_preserves_score() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let original = record("https://a.com/p", "Original title", now, 70.0);
    commit(&pool, &config, &[original], &[], now).await;

    let mut changed = record("https://a.com/p", "Updated title", now, 95.0);
    changed.popularity_signal = Some(400);
    commit(&pool, &config, &[changed], &[], now).await;

    let window = store::window(&pool).await.unwrap();
    assert_eq!(window.len(), 1);
    // Volatile metadata refreshed, stored score untouched.
    assert_eq!(window[0].title, "Updated title");
    assert_eq!(window[0].popularity_signal, Some(400));
    assert_eq!(window[0].score, 70.0);
}

#[tokio::test]
async fn test_force_update_recomputes_score() {
    let (_tmp, mut config, pool) = setup().await;
    let now = Utc::now();

    let original = record("https://a.com/p", "Original title", now, 70.0);
    commit(&pool, &config, &[original], &[], now).await;

    config.ingest.force_update = true;
    let rescored = record("https://a.com/p", "Original title", now, 95.0);
    commit(&pool, &config, &[rescored], &[], now).await;

    let window = store::window(&pool).await.unwrap();
    assert_eq!(window[0].score, 95.0);
}

#[tokio::test]
async fn test_archive_always_policy_for_sub_threshold_records() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let weak = record("https://a.com/weak", "Weak signal", now, 12.0);
    commit(&pool, &config, &[], &[weak.clone()], now).await;

    // Archived for completeness...
    let bucket = store::bucket_key(now);
    assert_eq!(store::archive_bucket(&pool, &bucket).await.unwrap().len(), 1);
    // ...but never windowed or indexed.
    assert!(store::window(&pool).await.unwrap().is_empty());
    assert_eq!(index::entry_count(&pool).await.unwrap(), 0);

    // And its id still blocks re-ingestion.
    let seen = store::seen_ids(&pool).await.unwrap();
    assert!(seen.contains(&weak.id));
}

#[tokio::test]
async fn test_retrieval_ranks_identical_content_first() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let a = record("https://a.com/a", "About embeddings", now, 70.0);
    let b = record("https://a.com/b", "About schedulers", now, 70.0);
    commit(&pool, &config, &[a.clone(), b.clone()], &[], now).await;

    index::upsert_vector(&pool, &a, "test-model", &[1.0, 0.0, 0.0])
        .await
        .unwrap();
    index::upsert_vector(&pool, &b, "test-model", &[0.0, 1.0, 0.0])
        .await
        .unwrap();

    // Query identical to record A's vector must rank A first at sim ≈ 1.
    let snippets = index::nearest_to_vector(&pool, &[1.0, 0.0, 0.0], 2)
        .await
        .unwrap();
    assert_eq!(snippets[0].record_id, a.id);
    assert!((snippets[0].similarity - 1.0).abs() < 1e-6);
    assert!(snippets[1].similarity < snippets[0].similarity);
}

#[tokio::test]
async fn test_retrieval_ties_broken_by_recency() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let older = record("https://a.com/old", "Older", now - Duration::days(5), 70.0);
    let newer = record("https://a.com/new", "Newer", now - Duration::days(1), 70.0);
    commit(&pool, &config, &[older.clone(), newer.clone()], &[], now).await;

    // Identical vectors — similarity ties exactly.
    index::upsert_vector(&pool, &older, "test-model", &[1.0, 0.0])
        .await
        .unwrap();
    index::upsert_vector(&pool, &newer, "test-model", &[1.0, 0.0])
        .await
        .unwrap();

    let snippets = index::nearest_to_vector(&pool, &[1.0, 0.0], 2).await.unwrap();
    assert_eq!(snippets[0].record_id, newer.id);
    assert_eq!(snippets[1].record_id, older.id);
}

#[tokio::test]
async fn test_reindex_unchanged_record_is_noop() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let a = record("https://a.com/a", "Stable content", now, 70.0);
    commit(&pool, &config, &[a.clone()], &[], now).await;

    assert!(index::upsert_vector(&pool, &a, "test-model", &[0.5, 0.5])
        .await
        .unwrap());
    // Same id, same content: no write.
    assert!(!index::upsert_vector(&pool, &a, "test-model", &[0.9, 0.1])
        .await
        .unwrap());
    assert_eq!(index::entry_count(&pool).await.unwrap(), 1);

    // Changed content: delete+reinsert.
    let mut changed = a.clone();
    changed.body_excerpt = "rewritten body".to_string();
    assert!(index::upsert_vector(&pool, &changed, "test-model", &[0.9, 0.1])
        .await
        .unwrap());
    assert_eq!(index::entry_count(&pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unrelated_query_still_returns_best_available_context() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let a = record("https://a.com/a", "Only entry", now, 70.0);
    commit(&pool, &config, &[a.clone()], &[], now).await;
    index::upsert_vector(&pool, &a, "test-model", &[1.0, 0.0])
        .await
        .unwrap();

    // Orthogonal query: similarity ~0, but retrieval succeeds — the
    // answer path grounds itself in low-similarity context, not an error.
    let snippets = index::nearest_to_vector(&pool, &[0.0, 1.0], 3).await.unwrap();
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0].similarity.abs() < 1e-6);
}

#[tokio::test]
async fn test_empty_index_is_a_typed_retrieval_failure() {
    let (_tmp, _config, pool) = setup().await;

    let result = index::nearest_to_vector(&pool, &[1.0, 0.0], 3).await;
    assert!(matches!(result, Err(QueryError::EmptyIndex)));
}

#[tokio::test]
async fn test_pruned_records_drop_out_of_the_index() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let aging = record("https://a.com/aging", "Aging", now - Duration::days(29), 70.0);
    commit(&pool, &config, &[aging.clone()], &[], now).await;
    index::upsert_vector(&pool, &aging, "test-model", &[1.0])
        .await
        .unwrap();
    assert_eq!(index::entry_count(&pool).await.unwrap(), 1);

    // Two days later the record leaves the window — and the index with it.
    let later = now + Duration::days(2);
    commit(&pool, &config, &[], &[], later).await;
    assert!(store::window(&pool).await.unwrap().is_empty());
    assert_eq!(index::entry_count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_last_run_checkpoint_advances() {
    let (_tmp, config, pool) = setup().await;

    assert!(store::last_run(&pool).await.unwrap().is_none());

    let cycle_start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    commit(&pool, &config, &[], &[], cycle_start).await;

    let last = store::last_run(&pool).await.unwrap().unwrap();
    assert_eq!(last, cycle_start);
}

#[tokio::test]
async fn test_seen_ids_cover_window_and_archive() {
    let (_tmp, config, pool) = setup().await;
    let now = Utc::now();

    let windowed = record("https://a.com/w", "Windowed", now, 70.0);
    let archived = record("https://a.com/ar", "Archived only", now, 10.0);
    commit(&pool, &config, &[windowed.clone()], &[archived.clone()], now).await;

    let seen: HashSet<String> = store::seen_ids(&pool).await.unwrap();
    assert!(seen.contains(&windowed.id));
    assert!(seen.contains(&archived.id));
}
