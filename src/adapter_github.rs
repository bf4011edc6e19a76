//! GitHub release adapter.
//!
//! Fetches releases for each configured repository via the GitHub REST API
//! and stamps them with the repo's current star count as the popularity
//! signal. A repository without releases (404) is skipped; request failures
//! are collected into the adapter's failure marker while the remaining
//! repositories still contribute data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapter::{FetchOutcome, SourceAdapter};
use crate::config::{GithubRepoConfig, GithubSourceConfig};
use crate::models::{RawRecord, SourceType};

const API_BASE: &str = "https://api.github.com";
const RELEASES_PER_REPO: usize = 10;
const EXCERPT_MAX_CHARS: usize = 500;

pub struct GithubAdapter {
    config: GithubSourceConfig,
    timeout_secs: u64,
}

impl GithubAdapter {
    pub fn new(config: GithubSourceConfig, timeout_secs: u64) -> Self {
        Self {
            config,
            timeout_secs,
        }
    }

    fn token(&self) -> Option<String> {
        let var = self.config.token_env.as_deref().unwrap_or("GITHUB_TOKEN");
        std::env::var(var).ok().filter(|t| !t.is_empty())
    }

    async fn fetch_repo(
        &self,
        client: &reqwest::Client,
        repo: &GithubRepoConfig,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>, String> {
        // Star count is best-effort; a failed metadata call never blocks
        // the release fetch.
        let stars = match client
            .get(format!("{}/repos/{}/{}", API_BASE, repo.owner, repo.repo))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("stargazers_count").and_then(|s| s.as_i64()))
                .unwrap_or(0),
            _ => 0,
        };

        let url = format!(
            "{}/repos/{}/{}/releases?per_page={}",
            API_BASE, repo.owner, repo.repo, RELEASES_PER_REPO
        );
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("{}/{}: {}", repo.owner, repo.repo, e))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(repo = %repo.repo, "no releases, skipping");
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(format!(
                "{}/{}: HTTP {}",
                repo.owner,
                repo.repo,
                resp.status()
            ));
        }

        let releases: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| format!("{}/{}: {}", repo.owner, repo.repo, e))?;

        let mut records = Vec::new();
        for release in &releases {
            let Some(published_at) = release
                .get("published_at")
                .or_else(|| release.get("created_at"))
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                continue;
            };
            if published_at <= window_start {
                continue;
            }
            let Some(html_url) = release.get("html_url").and_then(|v| v.as_str()) else {
                continue;
            };

            let tag = release
                .get("tag_name")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let rel_name = release.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let title = if rel_name.is_empty() {
                format!("[{}] {}", repo.name, tag)
            } else {
                format!("[{}] {}: {}", repo.name, tag, rel_name)
            };

            let body: String = release
                .get("body")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .chars()
                .take(EXCERPT_MAX_CHARS)
                .collect();

            records.push(RawRecord {
                source_type: SourceType::Release,
                source_name: format!("{} GitHub", repo.name),
                title,
                url: html_url.to_string(),
                body_excerpt: body,
                published_at,
                popularity_signal: Some(stars),
                category_hint: None,
                extra: serde_json::json!({
                    "version": tag,
                    "repo": format!("{}/{}", repo.owner, repo.repo),
                    "stars": stars,
                }),
            });
        }

        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for GithubAdapter {
    fn name(&self) -> &str {
        "github"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Release
    }

    async fn fetch(&self, window_start: DateTime<Utc>) -> FetchOutcome {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent("trendwatch");
        if let Some(token) = self.token() {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Ok(value) =
                reqwest::header::HeaderValue::from_str(&format!("token {token}"))
            {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            builder = builder.default_headers(headers);
        }
        let client = match builder.build() {
            Ok(c) => c,
            Err(e) => return FetchOutcome::failed(Vec::new(), e.to_string()),
        };

        let mut records = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        for repo in &self.config.repos {
            match self.fetch_repo(&client, repo, window_start).await {
                Ok(mut repo_records) => records.append(&mut repo_records),
                Err(e) => {
                    warn!(error = %e, "github repo fetch failed");
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
