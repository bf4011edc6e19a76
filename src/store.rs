//! Rolling window, monthly archive, and cycle checkpoint.
//!
//! The store owns all persisted pipeline state. A cycle's writes — window
//! upserts, archive appends, window pruning, and the last-run checkpoint —
//! happen in one transaction, so a persistence failure leaves nothing
//! half-committed and the next cycle can safely retry the same window.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::CycleError;
use crate::models::{Record, SourceType};

const LAST_RUN_KEY: &str = "last_run";

/// Counters returned by [`commit_cycle`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CommitStats {
    pub window_written: usize,
    pub archived: usize,
    pub pruned: usize,
}

/// Archive bucket key (`YYYY-MM`) for a record, derived from its publish
/// date — a late-arriving old record files into its historical month.
pub fn bucket_key(published_at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", published_at.year(), published_at.month())
}

/// All ids already persisted (window plus archive), for cross-run dedup.
pub async fn seen_ids(pool: &SqlitePool) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id FROM window_records UNION SELECT id FROM archive_records",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| r.get("id")).collect())
}

/// Commit one cycle's batch atomically.
///
/// * `admitted` records are upserted into the window and archived.
/// * `archived_only` records (sub-threshold) go to the archive alone.
/// * Window rows whose `published_at` fell out of `keep_days` are pruned,
///   along with their embedding entries.
/// * The last-run checkpoint advances to `cycle_start`.
///
/// Upsert-by-id refreshes volatile metadata (popularity, excerpt, title)
/// but preserves the stored score and tags; with `rescore` set (the
/// explicit force-update policy) the conflicting row is fully replaced.
pub async fn commit_cycle(
    pool: &SqlitePool,
    admitted: &[Record],
    archived_only: &[Record],
    cycle_start: DateTime<Utc>,
    keep_days: i64,
    rescore: bool,
) -> Result<CommitStats, CycleError> {
    let mut tx = pool.begin().await?;
    let mut stats = CommitStats::default();
    let now_ts = cycle_start.timestamp();

    for record in admitted {
        let conflict_update = if rescore {
            r#"
            ON CONFLICT(id) DO UPDATE SET
                source_type = excluded.source_type,
                source_name = excluded.source_name,
                title = excluded.title,
                body_excerpt = excluded.body_excerpt,
                url = excluded.url,
                published_at = excluded.published_at,
                popularity_signal = excluded.popularity_signal,
                categories_json = excluded.categories_json,
                is_breaking_change = excluded.is_breaking_change,
                score = excluded.score,
                extra_json = excluded.extra_json
            "#
        } else {
            r#"
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body_excerpt = excluded.body_excerpt,
                popularity_signal = excluded.popularity_signal,
                extra_json = excluded.extra_json
            "#
        };

        let sql = format!(
            r#"
            INSERT INTO window_records
                (id, source_type, source_name, title, body_excerpt, url,
                 published_at, popularity_signal, categories_json,
                 is_breaking_change, score, extra_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            {conflict_update}
            "#
        );

        sqlx::query(&sql)
            .bind(&record.id)
            .bind(record.source_type.as_str())
            .bind(&record.source_name)
            .bind(&record.title)
            .bind(&record.body_excerpt)
            .bind(&record.url)
            .bind(record.published_at.timestamp())
            .bind(record.popularity_signal)
            .bind(serde_json::to_string(&record.categories).unwrap_or_else(|_| "[]".into()))
            .bind(record.is_breaking_change as i64)
            .bind(record.score)
            .bind(record.extra.to_string())
            .execute(&mut *tx)
            .await?;
        stats.window_written += 1;
    }

    for record in admitted.iter().chain(archived_only.iter()) {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO archive_records
                (bucket, id, source_type, source_name, title, body_excerpt, url,
                 published_at, popularity_signal, categories_json,
                 is_breaking_change, score, extra_json, archived_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(bucket_key(record.published_at))
        .bind(&record.id)
        .bind(record.source_type.as_str())
        .bind(&record.source_name)
        .bind(&record.title)
        .bind(&record.body_excerpt)
        .bind(&record.url)
        .bind(record.published_at.timestamp())
        .bind(record.popularity_signal)
        .bind(serde_json::to_string(&record.categories).unwrap_or_else(|_| "[]".into()))
        .bind(record.is_breaking_change as i64)
        .bind(record.score)
        .bind(record.extra.to_string())
        .bind(now_ts)
        .execute(&mut *tx)
        .await?;
        stats.archived += result.rows_affected() as usize;
    }

    // Prune the window of records older than keep_days, and drop their
    // embedding entries with them.
    let cutoff = (cycle_start - Duration::days(keep_days)).timestamp();
    let pruned = sqlx::query("DELETE FROM window_records WHERE published_at < ?")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
    stats.pruned = pruned.rows_affected() as usize;
    sqlx::query(
        "DELETE FROM record_vectors WHERE record_id NOT IN (SELECT id FROM window_records)",
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO checkpoints (key, cursor, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
        "#,
    )
    .bind(LAST_RUN_KEY)
    .bind(cycle_start.timestamp().to_string())
    .bind(now_ts)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(
        window = stats.window_written,
        archived = stats.archived,
        pruned = stats.pruned,
        "cycle committed"
    );
    Ok(stats)
}

/// The live window, ordered score desc, published_at desc, id asc.
pub async fn window(pool: &SqlitePool) -> Result<Vec<Record>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, source_type, source_name, title, body_excerpt, url,
               published_at, popularity_signal, categories_json,
               is_breaking_change, score, extra_json
        FROM window_records
        ORDER BY score DESC, published_at DESC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_record).collect())
}

/// Look up a single live record by id.
pub async fn get_record(pool: &SqlitePool, id: &str) -> Result<Option<Record>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, source_type, source_name, title, body_excerpt, url,
               published_at, popularity_signal, categories_json,
               is_breaking_change, score, extra_json
        FROM window_records WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_record))
}

/// Records archived into one `YYYY-MM` bucket, publish order.
pub async fn archive_bucket(
    pool: &SqlitePool,
    bucket: &str,
) -> Result<Vec<Record>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, source_type, source_name, title, body_excerpt, url,
               published_at, popularity_signal, categories_json,
               is_breaking_change, score, extra_json
        FROM archive_records
        WHERE bucket = ?
        ORDER BY published_at DESC, id ASC
        "#,
    )
    .bind(bucket)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_record).collect())
}

/// Timestamp of the last committed cycle, if any. Absence means cold start.
pub async fn last_run(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let cursor: Option<String> =
        sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE key = ?")
            .bind(LAST_RUN_KEY)
            .fetch_optional(pool)
            .await?;

    Ok(cursor
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single()))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Record {
    let source_type: String = row.get("source_type");
    let categories_json: String = row.get("categories_json");
    let extra_json: String = row.get("extra_json");
    let published_ts: i64 = row.get("published_at");

    Record {
        id: row.get("id"),
        source_type: source_type.parse().unwrap_or(SourceType::Blog),
        source_name: row.get("source_name"),
        title: row.get("title"),
        body_excerpt: row.get("body_excerpt"),
        url: row.get("url"),
        published_at: Utc
            .timestamp_opt(published_ts, 0)
            .single()
            .unwrap_or_else(Utc::now),
        popularity_signal: row.get("popularity_signal"),
        categories: serde_json::from_str(&categories_json).unwrap_or_default(),
        is_breaking_change: row.get::<i64, _>("is_breaking_change") != 0,
        score: row.get("score"),
        extra: serde_json::from_str(&extra_json).unwrap_or(serde_json::Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_uses_publish_month() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 0).unwrap();
        assert_eq!(bucket_key(dt), "2025-03");
        let dt = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(bucket_key(dt), "2024-12");
    }
}
