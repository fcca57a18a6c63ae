//! Credential resolution for skill invocation
//!
//! Credentials are fetched by `credential_ref` immediately before each
//! call and dropped right after; they are never cached across processes
//! and never logged.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Result, SkillError};

/// Read access to the secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolve a credential by reference
    async fn resolve(&self, credential_ref: &str) -> Result<String>;
}

/// Secret store backed by environment variables
///
/// A `credential_ref` of `weather-api` resolves from
/// `FLOWHUB_SECRET_WEATHER_API`.
#[derive(Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Create an environment-backed store
    pub fn new() -> Self {
        Self
    }

    fn env_name(credential_ref: &str) -> String {
        let normalized: String = credential_ref
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("FLOWHUB_SECRET_{}", normalized)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn resolve(&self, credential_ref: &str) -> Result<String> {
        std::env::var(Self::env_name(credential_ref)).map_err(|_| SkillError::Auth {
            skill: String::new(),
            message: format!("credential '{}' not configured", credential_ref),
        })
    }
}

/// Fixed-map store for tests
#[derive(Default)]
pub struct StaticSecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl StaticSecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential
    pub fn insert(&self, credential_ref: impl Into<String>, secret: impl Into<String>) {
        self.secrets.write().insert(credential_ref.into(), secret.into());
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn resolve(&self, credential_ref: &str) -> Result<String> {
        self.secrets
            .read()
            .get(credential_ref)
            .cloned()
            .ok_or_else(|| SkillError::Auth {
                skill: String::new(),
                message: format!("credential '{}' not configured", credential_ref),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_name_normalization() {
        assert_eq!(
            EnvSecretStore::env_name("weather-api"),
            "FLOWHUB_SECRET_WEATHER_API"
        );
        assert_eq!(
            EnvSecretStore::env_name("ph.token"),
            "FLOWHUB_SECRET_PH_TOKEN"
        );
    }

    #[tokio::test]
    async fn test_static_store() {
        let store = StaticSecretStore::new();
        store.insert("key", "s3cret");
        assert_eq!(store.resolve("key").await.unwrap(), "s3cret");
        assert!(store.resolve("missing").await.is_err());
    }
}
