//! Skill invocation error taxonomy
//!
//! All of these are recoverable at the engine's error-edge level: when
//! the failing node has an outgoing error edge, the error becomes the
//! value flowing along it.

use thiserror::Error;

/// Result type for skill operations
pub type Result<T> = std::result::Result<T, SkillError>;

/// Errors produced by skill resolution and invocation
#[derive(Debug, Error)]
pub enum SkillError {
    /// No skill registered under the requested id
    #[error("Skill not found: {0}")]
    NotFound(String),

    /// The call exceeded the skill timeout or the node deadline
    #[error("Skill '{skill}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// Skill id
        skill: String,
        /// Time spent before giving up
        elapsed_ms: u64,
    },

    /// Endpoint answered with a non-success status
    #[error("Skill '{skill}' returned HTTP {status}")]
    Http {
        /// Skill id
        skill: String,
        /// Status code
        status: u16,
        /// Response body excerpt, secrets already absent
        body: String,
    },

    /// Connection-level failure (DNS, refused, reset)
    #[error("Skill '{skill}' transport error: {message}")]
    Transport {
        /// Skill id
        skill: String,
        /// Transport error description
        message: String,
    },

    /// Credential resolution failed or endpoint rejected the credential
    #[error("Skill '{skill}' authentication error: {message}")]
    Auth {
        /// Skill id
        skill: String,
        /// What went wrong, never including the credential itself
        message: String,
    },

    /// Endpoint rate limit hit and retries exhausted
    #[error("Skill '{skill}' rate limited")]
    RateLimited {
        /// Skill id
        skill: String,
        /// Server-provided retry hint, seconds
        retry_after_secs: Option<u64>,
    },

    /// Response did not conform to the skill's output schema
    #[error("Skill '{skill}' output mismatch: {message}")]
    OutputMismatch {
        /// Skill id
        skill: String,
        /// Validation errors joined
        message: String,
    },

    /// Bound inputs did not conform to the skill's input schema
    #[error("Skill '{skill}' input mismatch: {message}")]
    InputMismatch {
        /// Skill id
        skill: String,
        /// Validation errors joined
        message: String,
    },
}

impl SkillError {
    /// Stable kind string surfaced in step events and error-edge values
    pub fn kind(&self) -> &'static str {
        match self {
            SkillError::NotFound(_) => "SkillNotFound",
            SkillError::Timeout { .. } => "SkillTimeout",
            SkillError::Http { .. } => "SkillHttpError",
            SkillError::Transport { .. } => "SkillTransportError",
            SkillError::Auth { .. } => "SkillAuthError",
            SkillError::RateLimited { .. } => "SkillRateLimited",
            SkillError::OutputMismatch { .. } => "SkillOutputMismatch",
            SkillError::InputMismatch { .. } => "SkillInputMismatch",
        }
    }

    /// HTTP status carried by the error, when any
    pub fn status(&self) -> Option<u16> {
        match self {
            SkillError::Http { status, .. } => Some(*status),
            SkillError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SkillError::Transport { .. } | SkillError::Timeout { .. } => true,
            SkillError::Http { status, .. } => *status >= 500,
            SkillError::RateLimited { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_match_taxonomy() {
        let err = SkillError::Http {
            skill: "s".to_string(),
            status: 502,
            body: String::new(),
        };
        assert_eq!(err.kind(), "SkillHttpError");
        assert_eq!(err.status(), Some(502));
        assert!(err.is_transient());
    }

    #[test]
    fn test_4xx_not_transient() {
        let err = SkillError::Http {
            skill: "s".to_string(),
            status: 404,
            body: String::new(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limited_reports_429() {
        let err = SkillError::RateLimited {
            skill: "s".to_string(),
            retry_after_secs: Some(3),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.is_transient());
    }
}
