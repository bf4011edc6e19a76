use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent: every statement is IF NOT EXISTS.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Rolling window: at most one live record per id.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS window_records (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_name TEXT NOT NULL,
            title TEXT NOT NULL,
            body_excerpt TEXT NOT NULL,
            url TEXT NOT NULL,
            published_at INTEGER NOT NULL,
            popularity_signal INTEGER,
            categories_json TEXT NOT NULL DEFAULT '[]',
            is_breaking_change INTEGER NOT NULL DEFAULT 0,
            score REAL NOT NULL,
            extra_json TEXT NOT NULL DEFAULT 'null'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Monthly archive, partitioned by the record's published month, never
    // by ingestion time. Append-only: rows are inserted OR IGNOREd.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archive_records (
            bucket TEXT NOT NULL,
            id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            source_name TEXT NOT NULL,
            title TEXT NOT NULL,
            body_excerpt TEXT NOT NULL,
            url TEXT NOT NULL,
            published_at INTEGER NOT NULL,
            popularity_signal INTEGER,
            categories_json TEXT NOT NULL DEFAULT '[]',
            is_breaking_change INTEGER NOT NULL DEFAULT 0,
            score REAL NOT NULL,
            extra_json TEXT NOT NULL DEFAULT 'null',
            archived_at INTEGER NOT NULL,
            PRIMARY KEY (bucket, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Cycle checkpoints (last_run).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            key TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding entries for admitted records.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_vectors (
            record_id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_window_published_at ON window_records(published_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_window_score ON window_records(score DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_archive_bucket ON archive_records(bucket)")
        .execute(pool)
        .await?;

    Ok(())
}
