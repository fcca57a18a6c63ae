//! Bearer-token authentication
//!
//! Token validation is consumed from an external identity service; this
//! module only extracts the bearer token, asks the verifier for the
//! subject, and exposes the caller as an axum extractor. The admin flag
//! enables catalogue writes elsewhere but never foreign workflow access.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::error::ApiError;

/// The authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Token subject
    pub user_id: String,
    /// Superuser flag
    pub is_admin: bool,
}

/// Validates bearer tokens against the identity provider
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a token to its subject, or fail
    async fn verify(&self, token: &str) -> Result<AuthUser, ApiError>;
}

/// Verifier calling the external identity service's introspection
/// endpoint
pub struct RemoteTokenVerifier {
    client: reqwest::Client,
    introspect_url: String,
}

impl RemoteTokenVerifier {
    /// Create a verifier for the given introspection endpoint
    pub fn new(introspect_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            introspect_url: introspect_url.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for RemoteTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        #[derive(serde::Deserialize)]
        struct Introspection {
            active: bool,
            sub: Option<String>,
            #[serde(default)]
            admin: bool,
        }

        let response = self
            .client
            .post(&self.introspect_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("identity service: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Unauthorized("token rejected".to_string()));
        }

        let introspection: Introspection = response
            .json()
            .await
            .map_err(|e| ApiError::ServiceUnavailable(format!("identity service: {}", e)))?;

        match (introspection.active, introspection.sub) {
            (true, Some(sub)) => Ok(AuthUser {
                user_id: sub,
                is_admin: introspection.admin,
            }),
            _ => Err(ApiError::Unauthorized("token inactive".to_string())),
        }
    }
}

/// Fixed token → user map for tests and local development
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: RwLock<HashMap<String, AuthUser>>,
}

impl StaticTokenVerifier {
    /// Create an empty verifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user_id`
    pub fn insert(&self, token: impl Into<String>, user_id: impl Into<String>, is_admin: bool) {
        self.tokens.write().insert(
            token.into(),
            AuthUser {
                user_id: user_id.into(),
                is_admin,
            },
        );
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("unknown token".to_string()))
    }
}

/// Shared verifier handle stored in the router state
pub type SharedVerifier = Arc<dyn TokenVerifier>;

#[async_trait]
impl FromRequestParts<crate::api::routes::AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::api::routes::AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;

        state.verifier.verify(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticTokenVerifier::new();
        verifier.insert("t-alice", "alice", false);

        let user = verifier.verify("t-alice").await.unwrap();
        assert_eq!(user.user_id, "alice");
        assert!(!user.is_admin);
        assert!(verifier.verify("ghost").await.is_err());
    }
}
