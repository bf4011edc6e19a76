//! Source adapter trait and config-driven registry.
//!
//! Each external source type gets one adapter. Adapters are independent:
//! they share no mutable state, and a network or rate-limit failure in one
//! is reported as a per-adapter marker, never an `Err` that could abort the
//! cycle. Whatever partial data was retrieved before the failure is still
//! returned.
//!
//! The registry is a closed, configuration-driven set of the four built-in
//! variants — no runtime reflection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::models::{RawRecord, SourceType};

/// Result of one adapter fetch: partial data plus an optional failure
/// marker. `records` may be non-empty even when `failure` is set.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub failure: Option<String>,
}

impl FetchOutcome {
    pub fn ok(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            failure: None,
        }
    }

    pub fn failed(records: Vec<RawRecord>, failure: impl Into<String>) -> Self {
        Self {
            records,
            failure: Some(failure.into()),
        }
    }
}

/// A data source adapter that produces raw records for ingestion.
///
/// # Contract
///
/// * `fetch` takes the lower time bound of the window (cold start passes
///   `now − cold_start_days`) and returns everything published after it.
/// * Network, rate-limit, and parse trouble MUST NOT surface as a panic or
///   a fatal error — report it in [`FetchOutcome::failure`] and return the
///   partial data retrieved so far.
/// * No side effects beyond the network call.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Adapter name used in config, summaries, and logs (e.g. `"github"`).
    fn name(&self) -> &str;

    /// The source type stamped onto every record this adapter yields.
    fn source_type(&self) -> SourceType;

    /// Fetch records published after `window_start`.
    async fn fetch(&self, window_start: DateTime<Utc>) -> FetchOutcome;
}

/// Registry of enabled adapters, resolved statically from the config.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty adapter registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Create a registry holding every enabled adapter from the config.
    pub fn from_config(config: &Config) -> Self {
        use crate::adapter_arxiv::ArxivAdapter;
        use crate::adapter_github::GithubAdapter;
        use crate::adapter_hn::HnAdapter;
        use crate::adapter_rss::RssAdapter;

        let mut registry = Self::new();
        let timeout = config.ingest.fetch_timeout_secs;

        if let Some(cfg) = config.sources.github.as_ref().filter(|c| c.enabled) {
            registry.register(Box::new(GithubAdapter::new(cfg.clone(), timeout)));
        }
        if let Some(cfg) = config.sources.rss.as_ref().filter(|c| c.enabled) {
            registry.register(Box::new(RssAdapter::new(cfg.clone(), timeout)));
        }
        if let Some(cfg) = config.sources.hn.as_ref().filter(|c| c.enabled) {
            registry.register(Box::new(HnAdapter::new(
                cfg.clone(),
                config.thresholds.forum_min_points,
                timeout,
            )));
        }
        if let Some(cfg) = config.sources.arxiv.as_ref().filter(|c| c.enabled) {
            registry.register(Box::new(ArxivAdapter::new(cfg.clone(), timeout)));
        }

        registry
    }

    /// Register an adapter.
    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    /// All registered adapters.
    pub fn adapters(&self) -> &[Box<dyn SourceAdapter>] {
        &self.adapters
    }

    /// Consume the registry, yielding owned adapters for task spawning.
    pub fn into_adapters(self) -> Vec<Box<dyn SourceAdapter>> {
        self.adapters
    }

    /// Find an adapter by name.
    pub fn find(&self, name: &str) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::io::Write;

    #[test]
    fn test_registry_resolves_enabled_adapters() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(
            br#"
[db]
path = "data/tw.sqlite"

[sources.github]
repos = [{ owner = "o", repo = "r", name = "R" }]

[sources.hn]
enabled = false

[sources.arxiv]
"#,
        )
        .unwrap();
        let config = load_config(f.path()).unwrap();
        let registry = AdapterRegistry::from_config(&config);

        // github + arxiv enabled; hn disabled; rss absent.
        assert_eq!(registry.len(), 2);
        assert!(registry.find("github").is_some());
        assert!(registry.find("arxiv").is_some());
        assert!(registry.find("hn").is_none());
        assert!(registry.find("rss").is_none());
    }

    #[test]
    fn test_empty_config_yields_empty_registry() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"[db]\npath = \"data/tw.sqlite\"\n").unwrap();
        let config = load_config(f.path()).unwrap();
        let registry = AdapterRegistry::from_config(&config);
        assert!(registry.is_empty());
    }
}
