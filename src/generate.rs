//! Generation capability, consumed by the query engine.
//!
//! Wraps a local Ollama instance's `/api/chat` endpoint. The prompt
//! template variant is selected by [`GenerationMode`]; failures and
//! timeouts surface as typed errors — the caller never receives a
//! fabricated answer in place of a failed call.

use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::QueryError;

/// Prompt template variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// Grounded question answering over retrieved context.
    #[default]
    Standard,
    /// Deeper analysis: trends, notable items, breaking changes.
    Deep,
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(GenerationMode::Standard),
            "deep" => Ok(GenerationMode::Deep),
            other => Err(format!("unknown generation mode: {other}")),
        }
    }
}

/// System prompt for the selected template variant.
pub fn system_prompt(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Standard => {
            "You are an AI technology trend analyst. Answer the user's question \
             strictly from the retrieved context provided. Do not invent facts that \
             are not in the context. Cite entries by their bracketed number (e.g. [1]) \
             when referencing specific items. If the context is unrelated to the \
             question or insufficient, say so plainly."
        }
        GenerationMode::Deep => {
            "You are an AI technology trend analyst producing a deep analysis. From \
             the retrieved context, identify the most significant developments, call \
             out any breaking changes separately, and explain which item deserves the \
             most attention and why. Ground every claim in the context and cite \
             entries by their bracketed number (e.g. [1])."
        }
    }
}

/// Invoke the external generation capability.
///
/// Sends the assembled prompt to Ollama's chat endpoint and returns the
/// model output verbatim.
pub async fn generate(
    config: &GenerationConfig,
    prompt: &str,
    mode: GenerationMode,
) -> Result<String, QueryError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| QueryError::Generation(e.to_string()))?;

    let body = serde_json::json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": system_prompt(mode) },
            { "role": "user", "content": prompt },
        ],
        "stream": false,
        "options": { "num_predict": config.max_tokens },
    });

    let response = client
        .post(format!("{}/api/chat", config.url.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                QueryError::Generation(format!(
                    "generation timed out after {}s",
                    config.timeout_secs
                ))
            } else if e.is_connect() {
                QueryError::Generation(format!(
                    "cannot reach generation service at {} (is Ollama running?): {e}",
                    config.url
                ))
            } else {
                QueryError::Generation(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(QueryError::Generation(format!(
            "generation service returned {status}: {body_text}"
        )));
    }

    let json: serde_json::Value = response
        .json()
        .await
        .map_err(|e| QueryError::Generation(e.to_string()))?;

    let content = json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            QueryError::Generation("generation response missing message content".to_string())
        })?;

    Ok(content.trim().to_string())
}
