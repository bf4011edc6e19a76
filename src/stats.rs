//! Corpus statistics and health overview.
//!
//! A quick summary of what's persisted: window size, archive buckets,
//! index coverage, and per-source breakdowns. Used by `tw stats` to give
//! confidence that cycles and embeddings are working as expected.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::store;

struct SourceStats {
    source_name: String,
    record_count: i64,
    breaking_count: i64,
    avg_score: f64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, pool: &SqlitePool) -> Result<()> {
    let window_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM window_records")
        .fetch_one(pool)
        .await?;

    let archive_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM archive_records")
        .fetch_one(pool)
        .await?;

    let bucket_count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT bucket) FROM archive_records")
            .fetch_one(pool)
            .await?;

    let indexed_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM record_vectors")
        .fetch_one(pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Trendwatch — Corpus Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Window:      {} records", window_count);
    println!(
        "  Archive:     {} records in {} monthly buckets",
        archive_count, bucket_count
    );
    println!(
        "  Indexed:     {} / {} ({}%)",
        indexed_count,
        window_count,
        if window_count > 0 {
            (indexed_count * 100) / window_count
        } else {
            0
        }
    );

    match store::last_run(pool).await? {
        Some(ts) => println!("  Last cycle:  {}", ts.format("%Y-%m-%d %H:%M UTC")),
        None => println!("  Last cycle:  never (cold start pending)"),
    }

    // Per-source breakdown over the live window
    let source_rows = sqlx::query(
        r#"
        SELECT
            source_name,
            COUNT(*) AS record_count,
            SUM(is_breaking_change) AS breaking_count,
            AVG(score) AS avg_score
        FROM window_records
        GROUP BY source_name
        ORDER BY record_count DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source_name: row.get("source_name"),
            record_count: row.get("record_count"),
            breaking_count: row.get::<Option<i64>, _>("breaking_count").unwrap_or(0),
            avg_score: row.get::<Option<f64>, _>("avg_score").unwrap_or(0.0),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<28} {:>7} {:>9} {:>10}",
            "SOURCE", "RECORDS", "BREAKING", "AVG SCORE"
        );
        println!("  {}", "-".repeat(58));

        for s in &source_stats {
            println!(
                "  {:<28} {:>7} {:>9} {:>10.1}",
                s.source_name, s.record_count, s.breaking_count, s.avg_score
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
