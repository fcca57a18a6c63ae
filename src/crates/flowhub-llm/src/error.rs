//! Error types for LLM provider calls

use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when talking to the model provider
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status
    #[error("Provider returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// Request exceeded its deadline
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// API key missing or rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Provider rate limit hit
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Response body did not match the expected wire format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// `json_output` was requested but the completion is not valid JSON
    /// even after the repair pass
    #[error("Model output is not valid JSON: {0}")]
    Format(String),

    /// Configuration problem (missing endpoint, empty model name)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether retrying the call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) | LlmError::RateLimited(_) => true,
            LlmError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Stable kind string used in step event payloads
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::Http(_) => "LLMTransportError",
            LlmError::Status { .. } => "LLMHttpError",
            LlmError::Timeout(_) => "LLMTimeout",
            LlmError::Auth(_) => "LLMAuthError",
            LlmError::RateLimited(_) => "LLMRateLimited",
            LlmError::InvalidResponse(_) => "LLMInvalidResponse",
            LlmError::Format(_) => "LLMFormatError",
            LlmError::Config(_) => "LLMConfigError",
        }
    }
}
