//! Hacker News forum adapter.
//!
//! Queries the Algolia search API once per configured keyword, filtered to
//! stories at or above the forum point floor and inside the fetch window.
//! Story ids are de-duplicated across keywords; stories without an outbound
//! URL fall back to their HN item page.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::time::Duration;
use tracing::warn;

use crate::adapter::{FetchOutcome, SourceAdapter};
use crate::config::HnSourceConfig;
use crate::models::{RawRecord, SourceType};

const API_URL: &str = "https://hn.algolia.com/api/v1/search";

pub struct HnAdapter {
    config: HnSourceConfig,
    min_points: i64,
    timeout_secs: u64,
}

impl HnAdapter {
    pub fn new(config: HnSourceConfig, min_points: i64, timeout_secs: u64) -> Self {
        Self {
            config,
            min_points,
            timeout_secs,
        }
    }
}

#[async_trait]
impl SourceAdapter for HnAdapter {
    fn name(&self) -> &str {
        "hn"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Forum
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
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut failures: Vec<String> = Vec::new();

        for keyword in &self.config.keywords {
            let numeric_filters = format!(
                "points>={},created_at_i>={}",
                self.min_points,
                window_start.timestamp()
            );
            let hits_per_page = self.config.hits_per_keyword.to_string();

            let resp = client
                .get(API_URL)
                .query(&[
                    ("query", keyword.as_str()),
                    ("tags", "story"),
                    ("numericFilters", numeric_filters.as_str()),
                    ("hitsPerPage", hits_per_page.as_str()),
                ])
                .send()
                .await;

            let json: serde_json::Value = match resp {
                Ok(r) if r.status().is_success() => match r.json().await {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(keyword, error = %e, "hn response parse failed");
                        failures.push(format!("{keyword}: {e}"));
                        continue;
                    }
                },
                Ok(r) => {
                    warn!(keyword, status = %r.status(), "hn request rejected");
                    failures.push(format!("{keyword}: HTTP {}", r.status()));
                    continue;
                }
                Err(e) => {
                    warn!(keyword, error = %e, "hn request failed");
                    failures.push(format!("{keyword}: {e}"));
                    continue;
                }
            };

            let hits = json
                .get("hits")
                .and_then(|h| h.as_array())
                .cloned()
                .unwrap_or_default();

            for hit in &hits {
                let Some(hn_id) = hit.get("objectID").and_then(|v| v.as_str()) else {
                    continue;
                };
                if !seen_ids.insert(hn_id.to_string()) {
                    continue;
                }
                let Some(created_at) = hit.get("created_at_i").and_then(|v| v.as_i64()) else {
                    continue;
                };
                let Some(published_at) = Utc.timestamp_opt(created_at, 0).single() else {
                    continue;
                };

                let url = hit
                    .get("url")
                    .and_then(|v| v.as_str())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!("https://news.ycombinator.com/item?id={hn_id}")
                    });

                records.push(RawRecord {
                    source_type: SourceType::Forum,
                    source_name: "Hacker News".to_string(),
                    title: hit
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    url,
                    body_excerpt: String::new(),
                    published_at,
                    popularity_signal: hit.get("points").and_then(|v| v.as_i64()),
                    category_hint: None,
                    extra: serde_json::json!({
                        "hn_id": hn_id,
                        "comments": hit.get("num_comments").and_then(|v| v.as_i64()).unwrap_or(0),
                    }),
                });
            }
        }

        if failures.is_empty() {
            FetchOutcome::ok(records)
        } else {
            FetchOutcome::failed(records, failures.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_identity() {
        let adapter = HnAdapter::new(
            HnSourceConfig {
                enabled: true,
                keywords: vec!["LLM".into()],
                hits_per_keyword: 15,
            },
            50,
            10,
        );
        assert_eq!(adapter.name(), "hn");
        assert_eq!(adapter.source_type(), SourceType::Forum);
    }
}
