//! Skill catalogue types and read access
//!
//! Skills are owned by catalogue tools and maintained outside this
//! subsystem; from the engine's perspective the registry is read-only.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Result, SkillError};

/// HTTP methods a skill endpoint may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Map to the reqwest method type
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// Whether requests of this method carry a JSON body
    pub fn has_body(&self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

/// How the invoker attaches credentials to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthKind {
    /// No credential
    None,
    /// `Authorization: Bearer <secret>`
    Bearer,
    /// Secret in a named header
    ApiKeyHeader { header: String },
    /// Secret in a named query parameter
    ApiKeyQuery { param: String },
    /// HTTP basic auth; the secret is `user:password`
    Basic,
}

/// A declarative wrapper around an external HTTP capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Registry id referenced from Skill nodes
    pub id: String,
    /// Owning catalogue tool
    pub tool_id: Uuid,
    /// Display name
    pub name: String,
    /// Endpoint URL template; `{name}` segments substitute from inputs
    pub endpoint_url: String,
    /// HTTP method
    pub http_method: HttpMethod,
    /// Credential attachment scheme
    pub auth_kind: AuthKind,
    /// Key into the secret store; the credential itself is never stored
    pub credential_ref: String,
    /// JSON Schema the bound inputs must satisfy
    pub input_schema: Value,
    /// JSON Schema the response body must satisfy
    pub output_schema: Value,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Optional requests-per-minute hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// Read access to the skill catalogue
#[async_trait]
pub trait SkillRegistry: Send + Sync {
    /// Resolve a skill by id
    async fn get(&self, skill_id: &str) -> Result<Skill>;
}

/// Registry backed by a process-local map; used by tests and by the
/// server which hydrates it from the catalogue at startup
#[derive(Default)]
pub struct InMemorySkillRegistry {
    skills: RwLock<HashMap<String, Skill>>,
}

impl InMemorySkillRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a skill
    pub fn insert(&self, skill: Skill) {
        self.skills.write().insert(skill.id.clone(), skill);
    }

    /// Number of registered skills
    pub fn len(&self) -> usize {
        self.skills.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.skills.read().is_empty()
    }
}

#[async_trait]
impl SkillRegistry for InMemorySkillRegistry {
    async fn get(&self, skill_id: &str) -> Result<Skill> {
        self.skills
            .read()
            .get(skill_id)
            .cloned()
            .ok_or_else(|| SkillError::NotFound(skill_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_skill(id: &str) -> Skill {
        Skill {
            id: id.to_string(),
            tool_id: Uuid::new_v4(),
            name: "Weather".to_string(),
            endpoint_url: "https://api.example.com/weather/{city}".to_string(),
            http_method: HttpMethod::Get,
            auth_kind: AuthKind::Bearer,
            credential_ref: "weather-api".to_string(),
            input_schema: json!({"type": "object"}),
            output_schema: json!({"type": "object"}),
            timeout_ms: 5_000,
            rate_limit: None,
        }
    }

    #[tokio::test]
    async fn test_registry_round_trip() {
        let registry = InMemorySkillRegistry::new();
        registry.insert(sample_skill("weather"));

        let skill = registry.get("weather").await.unwrap();
        assert_eq!(skill.name, "Weather");
    }

    #[tokio::test]
    async fn test_unknown_skill() {
        let registry = InMemorySkillRegistry::new();
        let err = registry.get("ghost").await.unwrap_err();
        assert_eq!(err.kind(), "SkillNotFound");
    }

    #[test]
    fn test_auth_kind_serialization() {
        let kind = AuthKind::ApiKeyHeader { header: "X-Api-Key".to_string() };
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["kind"], "api_key_header");
        assert_eq!(value["header"], "X-Api-Key");
    }
}
