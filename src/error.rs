//! Failure taxonomy for the pipeline and the query path.
//!
//! Adapter and validation failures are recovered locally and aggregated into
//! the [`CycleSummary`](crate::models::CycleSummary); only persistence
//! failures abort a cycle. Query-time failures are returned to the caller as
//! typed variants, never masked by an empty answer.

use thiserror::Error;

/// Fatal error for an ingestion cycle.
///
/// The store commits a cycle in one transaction, so a persistence failure
/// leaves no partial state and the next cycle can retry the same window.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

/// Typed failure for the query/answer path.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The index holds no entries; there is nothing to ground an answer in.
    #[error("retrieval failure: the index is empty, run a sync first")]
    EmptyIndex,

    /// Embedding the question (or reading stored vectors) failed.
    #[error("retrieval failure: {0}")]
    Embedding(String),

    /// The index backend itself failed.
    #[error("retrieval failure: index lookup: {0}")]
    Index(#[from] sqlx::Error),

    /// The generation call failed or timed out. Surfaced verbatim; the
    /// caller never receives a fabricated answer in its place.
    #[error("generation failure: {0}")]
    Generation(String),
}
