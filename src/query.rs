//! Query engine: retrieval plus generation.
//!
//! A query session runs retrieve → generate, suspending on the index
//! lookup and again on the external generation call; a failure at either
//! point returns a typed error rather than partial output. Reads only
//! committed state — never in-flight cycle data.

use sqlx::SqlitePool;
use tracing::debug;

use crate::config::Config;
use crate::error::QueryError;
use crate::generate::{self, GenerationMode};
use crate::index;
use crate::models::ContextSnippet;

/// Per-snippet excerpt budget inside the assembled prompt.
const MAX_EXCERPT_CHARS: usize = 500;

/// A generated answer with the context it was grounded in.
#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub context: Vec<ContextSnippet>,
}

/// Retrieve the top-k context snippets for a question, ranked by
/// similarity (ties broken by recency).
pub async fn retrieve(
    pool: &SqlitePool,
    config: &Config,
    question: &str,
    k: usize,
) -> Result<Vec<ContextSnippet>, QueryError> {
    index::nearest(pool, &config.embedding, question, k).await
}

/// Answer a free-text question grounded in the retrieved corpus.
///
/// Low-similarity context is still context: as long as the index holds
/// entries, the best available snippets are handed to generation. Only an
/// empty index is a retrieval failure.
pub async fn answer(
    pool: &SqlitePool,
    config: &Config,
    question: &str,
    mode: GenerationMode,
) -> Result<Answer, QueryError> {
    let context = retrieve(pool, config, question, config.generation.top_k).await?;
    debug!(snippets = context.len(), "retrieved context");

    let prompt = build_prompt(question, &context);
    let text = generate::generate(&config.generation, &prompt, mode).await?;

    Ok(Answer { text, context })
}

/// Assemble the bounded user prompt: numbered context entries followed by
/// the question. Each excerpt is truncated to keep the prompt within a
/// predictable size regardless of corpus contents.
pub fn build_prompt(question: &str, context: &[ContextSnippet]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(context.len() + 4);
    lines.push("Retrieved context:".to_string());

    for (i, snippet) in context.iter().enumerate() {
        let excerpt = truncate_chars(&snippet.body_excerpt, MAX_EXCERPT_CHARS);
        lines.push(format!(
            "[{}] [{}] {} (source: {}, date: {})\n    {}",
            i + 1,
            snippet.category,
            snippet.title,
            snippet.source_name,
            snippet.published_at.format("%Y-%m-%d"),
            excerpt.replace('\n', " ")
        ));
    }

    lines.push(String::new());
    lines.push(format!("Question: {question}"));
    lines.join("\n\n")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
