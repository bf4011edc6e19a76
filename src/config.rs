use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub lexicon: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Fetch window on the very first run, when no checkpoint exists.
    #[serde(default = "default_cold_start_days")]
    pub cold_start_days: i64,
    /// Rolling-window retention, measured against `published_at`.
    #[serde(default = "default_keep_days")]
    pub keep_days: i64,
    /// Re-admit already-seen ids through the full pipeline instead of
    /// rejecting them at dedup.
    #[serde(default)]
    pub force_update: bool,
    /// Per-request HTTP timeout inside adapters.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Overall budget for one adapter's fetch; past it the adapter task is
    /// cancelled and reported as a failure.
    #[serde(default = "default_adapter_budget_secs")]
    pub adapter_budget_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            cold_start_days: default_cold_start_days(),
            keep_days: default_keep_days(),
            force_update: false,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            adapter_budget_secs: default_adapter_budget_secs(),
        }
    }
}

fn default_cold_start_days() -> i64 {
    7
}
fn default_keep_days() -> i64 {
    30
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_adapter_budget_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdsConfig {
    /// Records scoring below this are archived but never windowed or indexed.
    #[serde(default = "default_score_min")]
    pub score_min: f64,
    /// Forum posts below this point count are rejected before scoring.
    #[serde(default = "default_forum_min_points")]
    pub forum_min_points: i64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            score_min: default_score_min(),
            forum_min_points: default_forum_min_points(),
        }
    }
}

fn default_score_min() -> f64 {
    30.0
}
fn default_forum_min_points() -> i64 {
    50
}

/// Ranking tables for the scorer. Keys absent from the config fall back to
/// the built-in defaults in [`crate::score`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScoringConfig {
    /// Authority sub-score per source type, already scaled into [0, 30].
    #[serde(default)]
    pub authority: BTreeMap<String, f64>,
    /// Category sub-score per category tag, already scaled into [0, 25].
    #[serde(default)]
    pub category: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub github: Option<GithubSourceConfig>,
    #[serde(default)]
    pub rss: Option<RssSourceConfig>,
    #[serde(default)]
    pub hn: Option<HnSourceConfig>,
    #[serde(default)]
    pub arxiv: Option<ArxivSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub repos: Vec<GithubRepoConfig>,
    /// Optional API token; unauthenticated requests are rate-limited hard.
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubRepoConfig {
    pub owner: String,
    pub repo: String,
    /// Display label, e.g. `"LangChain"`.
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RssSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub feeds: Vec<RssFeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RssFeedConfig {
    pub url: String,
    pub name: String,
    /// Category hint applied when the classifier lexicons find nothing.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HnSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hn_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_hn_hits_per_keyword")]
    pub hits_per_keyword: usize,
}

fn default_hn_keywords() -> Vec<String> {
    [
        "LangChain",
        "LlamaIndex",
        "RAG",
        "AI Agent",
        "LLM",
        "DeepSeek",
        "MCP",
        "Claude",
        "GPT",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_hn_hits_per_keyword() -> usize {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArxivSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_arxiv_feeds")]
    pub feeds: Vec<RssFeedConfig>,
    /// Global cap across all paper feeds per cycle.
    #[serde(default = "default_arxiv_top_n")]
    pub top_n: usize,
}

fn default_arxiv_feeds() -> Vec<RssFeedConfig> {
    [
        ("https://arxiv.org/rss/cs.AI", "arXiv cs.AI"),
        ("https://arxiv.org/rss/cs.LG", "arXiv cs.LG"),
        ("https://arxiv.org/rss/cs.CL", "arXiv cs.CL"),
    ]
    .iter()
    .map(|(url, name)| RssFeedConfig {
        url: url.to_string(),
        name: name.to_string(),
        category: Some("paper".to_string()),
    })
    .collect()
}

fn default_arxiv_top_n() -> usize {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embed_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_gen_url")]
    pub url: String,
    #[serde(default = "default_gen_model")]
    pub model: String,
    #[serde(default = "default_gen_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
    /// Context snippets retrieved per question.
    #[serde(default = "default_gen_top_k")]
    pub top_k: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_gen_url(),
            model: default_gen_model(),
            max_tokens: default_gen_max_tokens(),
            timeout_secs: default_gen_timeout_secs(),
            top_k: default_gen_top_k(),
        }
    }
}

fn default_gen_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_gen_model() -> String {
    "qwen2.5:3b".to_string()
}
fn default_gen_max_tokens() -> u32 {
    1024
}
fn default_gen_timeout_secs() -> u64 {
    120
}
fn default_gen_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_context_path")]
    pub context_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            context_path: default_context_path(),
        }
    }
}

fn default_context_path() -> PathBuf {
    PathBuf::from("data/ai_context.md")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ingest.keep_days < 1 {
        anyhow::bail!("ingest.keep_days must be >= 1");
    }
    if config.ingest.cold_start_days < 1 {
        anyhow::bail!("ingest.cold_start_days must be >= 1");
    }
    if !(0.0..=100.0).contains(&config.thresholds.score_min) {
        anyhow::bail!("thresholds.score_min must be in [0, 100]");
    }
    if config.generation.top_k == 0 {
        anyhow::bail!("generation.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_minimal_config_defaults() {
        let f = write_config("[db]\npath = \"data/tw.sqlite\"\n");
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.ingest.cold_start_days, 7);
        assert_eq!(config.ingest.keep_days, 30);
        assert!(!config.ingest.force_update);
        assert_eq!(config.thresholds.score_min, 30.0);
        assert_eq!(config.thresholds.forum_min_points, 50);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.generation.top_k, 5);
    }

    #[test]
    fn test_embedding_requires_model_and_dims() {
        let f = write_config(
            "[db]\npath = \"data/tw.sqlite\"\n[embedding]\nprovider = \"ollama\"\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_unknown_embedding_provider_rejected() {
        let f = write_config(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"chroma\"\nmodel = \"m\"\ndims = 8\n",
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn test_source_lists_parse() {
        let f = write_config(
            r#"
[db]
path = "data/tw.sqlite"

[sources.github]
repos = [{ owner = "langchain-ai", repo = "langchain", name = "LangChain" }]

[sources.rss]
feeds = [{ url = "https://openai.com/blog/rss.xml", name = "OpenAI Blog", category = "llm" }]

[lexicon]
framework = ["langchain", "llamaindex"]
llm = ["gpt", "claude"]
"#,
        );
        let config = load_config(f.path()).unwrap();
        let github = config.sources.github.unwrap();
        assert_eq!(github.repos.len(), 1);
        assert!(github.enabled);
        assert_eq!(config.lexicon["llm"], vec!["gpt", "claude"]);
    }
}
