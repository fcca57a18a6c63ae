//! Product Hunt discovery via the v2 GraphQL API

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::catalogue::CandidateTool;
use crate::error::{Result, TaskError};
use crate::sources::DiscoverySource;

const SOURCE: &str = "producthunt";

const POSTS_QUERY: &str = r#"
query TodaysPosts {
  posts(order: VOTES, first: 50) {
    edges {
      node { slug name tagline votesCount website }
    }
  }
}
"#;

/// Product Hunt crawler
pub struct ProductHuntSource {
    client: Client,
    base_url: String,
    api_token: String,
    min_votes: i64,
}

impl ProductHuntSource {
    /// Create a crawler against the public API
    pub fn new(api_token: impl Into<String>, min_votes: i64) -> Self {
        Self::with_base_url("https://api.producthunt.com", api_token, min_votes)
    }

    /// Create a crawler against a custom endpoint (tests)
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        min_votes: i64,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            min_votes,
        }
    }

    /// Extract candidates from a GraphQL response body
    pub(crate) fn parse_response(body: &Value) -> Vec<CandidateTool> {
        let Some(edges) = body
            .pointer("/data/posts/edges")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        edges
            .iter()
            .filter_map(|edge| {
                let node = edge.get("node")?;
                let slug = node.get("slug")?.as_str()?.to_string();
                let votes = node.get("votesCount").and_then(Value::as_i64).unwrap_or(0);
                Some(CandidateTool {
                    source: SOURCE.to_string(),
                    slug,
                    raw_payload: node.clone(),
                    discovered_at: Utc::now(),
                    score: votes,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DiscoverySource for ProductHuntSource {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self) -> Result<Vec<CandidateTool>> {
        let response = self
            .client
            .post(format!("{}/v2/api/graphql", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&json!({"query": POSTS_QUERY}))
            .send()
            .await
            .map_err(TaskError::transport)?;

        if !response.status().is_success() {
            return Err(TaskError::Retryable(format!(
                "producthunt returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(TaskError::transport)?;
        let candidates = Self::parse_response(&body);
        debug!(count = candidates.len(), "producthunt fetch complete");
        Ok(candidates)
    }

    fn quality_gate(&self, candidate: &CandidateTool) -> bool {
        candidate.score >= self.min_votes
    }
}
