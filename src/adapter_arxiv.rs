//! arXiv paper adapter.
//!
//! Reads the configured arXiv RSS feeds through the shared feed parser.
//! Each feed gets an even share of the configured `top_n` budget and the
//! combined result is capped at `top_n`; URLs are de-duplicated across
//! feeds since papers are cross-listed between categories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

use crate::adapter::{FetchOutcome, SourceAdapter};
use crate::adapter_rss::fetch_feed;
use crate::config::ArxivSourceConfig;
use crate::models::{RawRecord, SourceType};

pub struct ArxivAdapter {
    config: ArxivSourceConfig,
    timeout_secs: u64,
}

impl ArxivAdapter {
    pub fn new(config: ArxivSourceConfig, timeout_secs: u64) -> Self {
        Self {
            config,
            timeout_secs,
        }
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Paper
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

        let feed_count = self.config.feeds.len().max(1);
        let per_feed = (self.config.top_n / feed_count).max(1);

        let mut records: Vec<RawRecord> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut failures: Vec<String> = Vec::new();

        for feed_cfg in &self.config.feeds {
            match fetch_feed(&client, feed_cfg, SourceType::Paper, window_start).await {
                Ok(feed_records) => {
                    let mut taken = 0usize;
                    for mut record in feed_records {
                        if taken >= per_feed {
                            break;
                        }
                        if !seen_urls.insert(record.url.clone()) {
                            continue;
                        }
                        // Papers carry no popularity signal from the feed.
                        record.popularity_signal = None;
                        records.push(record);
                        taken += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "arxiv feed fetch failed");
                    failures.push(e);
                }
            }
        }

        records.truncate(self.config.top_n);

        if failures.is_empty() {
            FetchOutcome::ok(records)
        } else {
            FetchOutcome::failed(records, failures.join("; "))
        }
    }
}
