//! GitHub trending discovery via the search API

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::catalogue::CandidateTool;
use crate::error::{Result, TaskError};
use crate::sources::DiscoverySource;

const SOURCE: &str = "github_trending";

fn default_keywords() -> Vec<String> {
    ["ai", "llm", "agent", "gpt", "copilot"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// GitHub trending crawler
///
/// Uses the search API ordered by stars over a recent window; trending
/// pages themselves have no API.
pub struct GithubTrendingSource {
    client: Client,
    base_url: String,
    keywords: Vec<String>,
}

impl GithubTrendingSource {
    /// Create a crawler with the default AI keyword gate
    pub fn new() -> Self {
        Self::with_base_url("https://api.github.com", default_keywords())
    }

    /// Create a crawler against a custom endpoint (tests)
    pub fn with_base_url(base_url: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            keywords,
        }
    }

    /// Extract candidates from a search response body
    pub(crate) fn parse_response(body: &Value) -> Vec<CandidateTool> {
        let Some(items) = body.get("items").and_then(Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| {
                let full_name = item.get("full_name")?.as_str()?;
                let stars = item
                    .get("stargazers_count")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                Some(CandidateTool {
                    source: SOURCE.to_string(),
                    // Owner/name collapses to a URL-safe slug
                    slug: full_name.replace('/', "--"),
                    raw_payload: item.clone(),
                    discovered_at: Utc::now(),
                    score: stars,
                })
            })
            .collect()
    }

    fn text_of(candidate: &CandidateTool) -> String {
        let name = candidate
            .raw_payload
            .get("full_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let description = candidate
            .raw_payload
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let topics = candidate
            .raw_payload
            .get("topics")
            .and_then(Value::as_array)
            .map(|t| {
                t.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        format!("{} {} {}", name, description, topics).to_lowercase()
    }
}

impl Default for GithubTrendingSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoverySource for GithubTrendingSource {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self) -> Result<Vec<CandidateTool>> {
        let query = self.keywords.join(" OR ");
        let response = self
            .client
            .get(format!("{}/search/repositories", self.base_url))
            .query(&[
                ("q", query.as_str()),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", "50"),
            ])
            .header("user-agent", "flowhub-crawler")
            .send()
            .await
            .map_err(TaskError::transport)?;

        if !response.status().is_success() {
            return Err(TaskError::Retryable(format!(
                "github returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(TaskError::transport)?;
        let candidates = Self::parse_response(&body);
        debug!(count = candidates.len(), "github fetch complete");
        Ok(candidates)
    }

    fn quality_gate(&self, candidate: &CandidateTool) -> bool {
        let text = Self::text_of(candidate);
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}
