//! Provider configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LlmError, Result};

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Configuration for the chat-completions provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Base URL of the provider, e.g. "https://api.openai.com/v1"
    pub base_url: String,

    /// Default model identifier; LLM nodes may override per node
    pub model: String,

    /// Total request timeout
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

impl LlmConfig {
    /// Create a configuration with the default timeout
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: default_timeout(),
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read configuration from the environment
    ///
    /// Reads `FLOWHUB_LLM_API_KEY`, `FLOWHUB_LLM_BASE_URL` and
    /// `FLOWHUB_LLM_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FLOWHUB_LLM_API_KEY")
            .map_err(|_| LlmError::Config("FLOWHUB_LLM_API_KEY not set".to_string()))?;
        let base_url = std::env::var("FLOWHUB_LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("FLOWHUB_LLM_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());

        Ok(Self::new(api_key, base_url, model))
    }

    /// Chat-completions endpoint URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
