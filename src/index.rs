//! Retrieval index over admitted records.
//!
//! Each admitted record gets one embedding entry: `(record_id, content
//! hash, vector, metadata snapshot)`. Re-indexing an unchanged record is a
//! no-op; a changed record is deleted and reinserted, never mutated in
//! place. Lookups embed the question with the same provider used at index
//! time and rank stored entries by cosine similarity, ties broken by
//! recency.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::config::EmbeddingConfig;
use crate::embedding;
use crate::error::QueryError;
use crate::models::{ContextSnippet, Record};

/// Metadata snapshot persisted alongside each vector. Frozen at index
/// time so retrieval does not depend on the window's current contents.
#[derive(Debug, Serialize, Deserialize)]
struct EntrySnapshot {
    title: String,
    url: String,
    source_name: String,
    category: String,
    published_at: i64,
    body_excerpt: String,
}

impl From<&Record> for EntrySnapshot {
    fn from(record: &Record) -> Self {
        Self {
            title: record.title.clone(),
            url: record.url.clone(),
            source_name: record.source_name.clone(),
            category: record.primary_category().to_string(),
            published_at: record.published_at.timestamp(),
            body_excerpt: record.body_excerpt.clone(),
        }
    }
}

/// Counters returned by [`index_records`].
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexStats {
    /// Entries written this call.
    pub indexed: usize,
    /// Entries already current (unchanged id + content) — no-ops.
    pub unchanged: usize,
    /// Records whose embedding failed; retried on a later cycle.
    pub pending: usize,
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Embed and store entries for a batch of admitted records.
///
/// Embedding failures are non-fatal: the cycle proceeds and failed records
/// are counted as pending. With the provider disabled this is a no-op that
/// reports everything pending.
pub async fn index_records(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    records: &[Record],
) -> IndexStats {
    let mut stats = IndexStats::default();

    if !config.is_enabled() {
        stats.pending = records.len();
        return stats;
    }

    let provider = match embedding::create_provider(config) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "could not create embedding provider");
            stats.pending = records.len();
            return stats;
        }
    };
    let model_name = provider.model_name().to_string();

    for batch in records.chunks(config.batch_size) {
        // Skip entries whose content hasn't changed since indexing.
        let mut need_indexing = Vec::new();
        for record in batch {
            match is_current(pool, record).await {
                Ok(true) => stats.unchanged += 1,
                Ok(false) => need_indexing.push(record),
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "index lookup failed");
                    stats.pending += 1;
                }
            }
        }

        if need_indexing.is_empty() {
            continue;
        }

        let texts: Vec<String> = need_indexing
            .iter()
            .map(|r| r.embedding_text())
            .collect();

        match embedding::embed_texts(provider.as_ref(), config, &texts).await {
            Ok(vectors) => {
                for (record, vec) in need_indexing.iter().zip(vectors.iter()) {
                    match upsert_vector(pool, record, &model_name, vec).await {
                        Ok(_) => stats.indexed += 1,
                        Err(e) => {
                            warn!(record_id = %record.id, error = %e, "failed to store embedding");
                            stats.pending += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "embedding batch failed");
                stats.pending += need_indexing.len();
            }
        }
    }

    stats
}

/// Whether the stored entry for a record matches its current content.
async fn is_current(pool: &SqlitePool, record: &Record) -> Result<bool, sqlx::Error> {
    let hash = content_hash(&record.embedding_text());
    let existing: Option<String> =
        sqlx::query_scalar("SELECT content_hash FROM record_vectors WHERE record_id = ?")
            .bind(&record.id)
            .fetch_optional(pool)
            .await?;
    Ok(existing.as_deref() == Some(hash.as_str()))
}

/// Store the vector entry for a record.
///
/// Content changes are delete+reinsert, never an in-place vector update;
/// an entry that is already current is left untouched. Returns whether a
/// write happened.
pub async fn upsert_vector(
    pool: &SqlitePool,
    record: &Record,
    model: &str,
    vector: &[f32],
) -> Result<bool, sqlx::Error> {
    if is_current(pool, record).await? {
        return Ok(false);
    }

    let hash = content_hash(&record.embedding_text());
    let snapshot = EntrySnapshot::from(record);
    let metadata_json = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM record_vectors WHERE record_id = ?")
        .bind(&record.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO record_vectors
            (record_id, content_hash, model, dims, embedding, metadata_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(hash)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(embedding::vec_to_blob(vector))
    .bind(metadata_json)
    .bind(Utc::now().timestamp())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(true)
}

/// Count of live index entries.
pub async fn entry_count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM record_vectors")
        .fetch_one(pool)
        .await
}

/// Retrieve the `k` nearest entries to a free-text question.
///
/// The question is embedded with the same provider used at index time.
/// An empty index is a typed retrieval failure, not an empty result.
pub async fn nearest(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    question: &str,
    k: usize,
) -> Result<Vec<ContextSnippet>, QueryError> {
    if entry_count(pool).await? == 0 {
        return Err(QueryError::EmptyIndex);
    }

    let provider =
        embedding::create_provider(config).map_err(|e| QueryError::Embedding(e.to_string()))?;
    let query_vec = embedding::embed_query(provider.as_ref(), config, question)
        .await
        .map_err(|e| QueryError::Embedding(e.to_string()))?;

    nearest_to_vector(pool, &query_vec, k).await
}

/// Rank stored entries by cosine similarity against a query vector,
/// descending, ties broken by `published_at` descending.
pub async fn nearest_to_vector(
    pool: &SqlitePool,
    query_vec: &[f32],
    k: usize,
) -> Result<Vec<ContextSnippet>, QueryError> {
    let rows = sqlx::query("SELECT record_id, embedding, metadata_json FROM record_vectors")
        .fetch_all(pool)
        .await?;

    if rows.is_empty() {
        return Err(QueryError::EmptyIndex);
    }

    let mut snippets: Vec<ContextSnippet> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(query_vec, &vec) as f64;

            let metadata_json: String = row.get("metadata_json");
            let snapshot: EntrySnapshot =
                serde_json::from_str(&metadata_json).unwrap_or(EntrySnapshot {
                    title: String::new(),
                    url: String::new(),
                    source_name: String::new(),
                    category: "other".to_string(),
                    published_at: 0,
                    body_excerpt: String::new(),
                });

            ContextSnippet {
                record_id: row.get("record_id"),
                title: snapshot.title,
                url: snapshot.url,
                source_name: snapshot.source_name,
                category: snapshot.category,
                published_at: Utc
                    .timestamp_opt(snapshot.published_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                body_excerpt: snapshot.body_excerpt,
                similarity,
            }
        })
        .collect();

    snippets.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.published_at.cmp(&a.published_at))
            .then(a.record_id.cmp(&b.record_id))
    });
    snippets.truncate(k);

    Ok(snippets)
}
