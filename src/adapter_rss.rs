//! RSS/Atom blog adapter.
//!
//! Fetches each configured feed, parses it with the shared feed parser,
//! and yields one record per entry inside the fetch window. Feeds carry a
//! category hint the classifier falls back on. A feed that fails to fetch
//! or parse contributes to the failure marker without blocking the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

use crate::adapter::{FetchOutcome, SourceAdapter};
use crate::config::{RssFeedConfig, RssSourceConfig};
use crate::feed;
use crate::models::{RawRecord, SourceType};

const EXCERPT_MAX_CHARS: usize = 500;

pub struct RssAdapter {
    config: RssSourceConfig,
    timeout_secs: u64,
}

impl RssAdapter {
    pub fn new(config: RssSourceConfig, timeout_secs: u64) -> Self {
        Self {
            config,
            timeout_secs,
        }
    }
}

/// Fetch and parse one feed into records. Shared with the arXiv adapter,
/// which layers its own quota logic on top.
pub async fn fetch_feed(
    client: &reqwest::Client,
    feed_cfg: &RssFeedConfig,
    source_type: SourceType,
    window_start: DateTime<Utc>,
) -> Result<Vec<RawRecord>, String> {
    let resp = client
        .get(&feed_cfg.url)
        .send()
        .await
        .map_err(|e| format!("{}: {}", feed_cfg.name, e))?;

    if !resp.status().is_success() {
        return Err(format!("{}: HTTP {}", feed_cfg.name, resp.status()));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| format!("{}: {}", feed_cfg.name, e))?;

    let entries = feed::parse_feed(&body).map_err(|e| format!("{}: {}", feed_cfg.name, e))?;

    let mut records = Vec::new();
    for entry in entries {
        // Entries without a link or a parseable date are malformed input.
        if entry.link.is_empty() {
            continue;
        }
        let Some(published_at) = entry.published else {
            continue;
        };
        if published_at <= window_start {
            continue;
        }

        let excerpt: String = entry.summary.chars().take(EXCERPT_MAX_CHARS).collect();
        records.push(RawRecord {
            source_type,
            source_name: feed_cfg.name.clone(),
            title: entry.title.trim().to_string(),
            url: entry.link,
            body_excerpt: excerpt,
            published_at,
            popularity_signal: None,
            category_hint: feed_cfg.category.clone(),
            extra: serde_json::Value::Null,
        });
    }

    Ok(records)
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn name(&self) -> &str {
        "rss"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Blog
    }

    async fn fetch(&self, window_start: DateTime<Utc>) -> FetchOutcome {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent("trendwatch")
            .build()
        {
            Ok(c) => c,
            Err(e) => return FetchOutcome::failed(Vec::new(), e.to_string()),
        };

        let mut records = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for feed_cfg in &self.config.feeds {
            match fetch_feed(&client, feed_cfg, SourceType::Blog, window_start).await {
                Ok(mut feed_records) => records.append(&mut feed_records),
                Err(e) => {
                    warn!(error = %e, "rss feed fetch failed");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            FetchOutcome::ok(records)
        } else {
            FetchOutcome::failed(records, failures.join("; "))
        }
    }
}
