//! HTTP invoker for skill calls
//!
//! Uniform guarantees for every skill dispatch:
//! - credentials resolved immediately before the call, never logged
//! - per-attempt timeout of `min(skill.timeout_ms, deadline - now)`
//! - at most 2 attempts on transient failures (network, 5xx, 429 with
//!   `Retry-After` honored), exponential backoff base 200ms factor 2
//!   with ±20% jitter; other 4xx never retried
//! - response parsed and validated against the skill's output schema

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{Result, SkillError};
use crate::registry::{AuthKind, Skill};
use crate::schema::validation_errors;
use crate::secrets::SecretStore;

/// Retry and backoff tuning for the invoker
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Maximum attempts per call, including the first
    pub max_attempts: u32,
    /// Base backoff delay
    pub backoff_base: Duration,
    /// Backoff multiplier per attempt
    pub backoff_factor: f64,
    /// Jitter fraction applied to each delay
    pub jitter: f64,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_base: Duration::from_millis(200),
            backoff_factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl InvokerConfig {
    /// Backoff delay for a 0-indexed retry, jittered
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.backoff_base.as_secs_f64() * self.backoff_factor.powi(retry as i32);
        let jitter_factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        Duration::from_secs_f64(base * jitter_factor)
    }
}

/// Dispatches skill calls with uniform guarantees
pub struct SkillInvoker {
    client: Client,
    secrets: Arc<dyn SecretStore>,
    config: InvokerConfig,
}

impl SkillInvoker {
    /// Create an invoker with default retry configuration
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self::with_config(secrets, InvokerConfig::default())
    }

    /// Create an invoker with custom retry configuration
    pub fn with_config(secrets: Arc<dyn SecretStore>, config: InvokerConfig) -> Self {
        Self {
            client: Client::new(),
            secrets,
            config,
        }
    }

    /// Invoke `skill` with inputs already conforming to its input schema
    ///
    /// `deadline` is the absolute point after which no further attempt
    /// is started and in-flight attempts are abandoned.
    pub async fn invoke(
        &self,
        skill: &Skill,
        bound_inputs: &Value,
        deadline: Instant,
    ) -> Result<Value> {
        let input_errors = validation_errors(&skill.input_schema, bound_inputs);
        if !input_errors.is_empty() {
            return Err(SkillError::InputMismatch {
                skill: skill.id.clone(),
                message: input_errors.join("; "),
            });
        }

        let (url, leftover) = render_url(&skill.endpoint_url, bound_inputs);

        let mut last_err: Option<SkillError> = None;
        for attempt in 0..self.config.max_attempts {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let attempt_timeout = Duration::from_millis(skill.timeout_ms).min(remaining);

            if attempt > 0 {
                debug!(skill = %skill.id, attempt, "retrying skill call");
            }

            match self
                .attempt(skill, &url, &leftover, attempt_timeout)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = match &err {
                        SkillError::RateLimited {
                            retry_after_secs: Some(secs),
                            ..
                        } => Duration::from_secs(*secs),
                        _ => self.config.delay_for(attempt),
                    };
                    warn!(skill = %skill.id, error = %err, delay_ms = delay.as_millis() as u64,
                          "transient skill failure, backing off");
                    let now = Instant::now();
                    if now + delay >= deadline {
                        last_err = Some(err);
                        break;
                    }
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| SkillError::Timeout {
            skill: skill.id.clone(),
            elapsed_ms: 0,
        }))
    }

    async fn attempt(
        &self,
        skill: &Skill,
        url: &str,
        leftover: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        // Fresh credential per attempt, dropped at the end of this scope
        let credential = match &skill.auth_kind {
            AuthKind::None => None,
            _ => Some(self.secrets.resolve(&skill.credential_ref).await.map_err(
                |_| SkillError::Auth {
                    skill: skill.id.clone(),
                    message: format!("credential '{}' not resolvable", skill.credential_ref),
                },
            )?),
        };

        let mut request = self
            .client
            .request(skill.http_method.as_reqwest(), url)
            .timeout(timeout);

        if skill.http_method.has_body() {
            request = request.json(&Value::Object(leftover.clone()));
        } else if !leftover.is_empty() {
            let query: Vec<(String, String)> = leftover
                .iter()
                .map(|(k, v)| (k.clone(), query_value(v)))
                .collect();
            request = request.query(&query);
        }

        request = match (&skill.auth_kind, credential) {
            (AuthKind::None, _) => request,
            (AuthKind::Bearer, Some(secret)) => request.bearer_auth(secret),
            (AuthKind::ApiKeyHeader { header }, Some(secret)) => {
                request.header(header.as_str(), secret)
            }
            (AuthKind::ApiKeyQuery { param }, Some(secret)) => {
                request.query(&[(param.as_str(), secret.as_str())])
            }
            (AuthKind::Basic, Some(secret)) => match secret.split_once(':') {
                Some((user, password)) => request.basic_auth(user, Some(password)),
                None => request.basic_auth(secret, Option::<&str>::None),
            },
            // Unreachable: credential is Some for every kind but None
            (_, None) => request,
        };

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SkillError::Timeout {
                    skill: skill.id.clone(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                SkillError::Transport {
                    skill: skill.id.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(SkillError::RateLimited {
                skill: skill.id.clone(),
                retry_after_secs,
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SkillError::Auth {
                skill: skill.id.clone(),
                message: format!("endpoint rejected credential with {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SkillError::Http {
                skill: skill.id.clone(),
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let body = response.text().await.map_err(|e| SkillError::Transport {
            skill: skill.id.clone(),
            message: e.to_string(),
        })?;
        let parsed: Value =
            serde_json::from_str(&body).unwrap_or_else(|_| Value::String(body.clone()));

        let output_errors = validation_errors(&skill.output_schema, &parsed);
        if !output_errors.is_empty() {
            return Err(SkillError::OutputMismatch {
                skill: skill.id.clone(),
                message: output_errors.join("; "),
            });
        }

        Ok(parsed)
    }
}

/// Substitute `{name}` path segments from the inputs; returns the
/// rendered URL and the inputs not consumed by path substitution
fn render_url(template: &str, bound_inputs: &Value) -> (String, Map<String, Value>) {
    let empty = Map::new();
    let inputs = bound_inputs.as_object().unwrap_or(&empty);
    let mut url = String::with_capacity(template.len());
    let mut consumed: Vec<&str> = Vec::new();

    let mut rest = template;
    while let Some(open) = rest.find('{') {
        url.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close_offset) => {
                let name = &rest[open + 1..open + close_offset];
                match inputs.get(name) {
                    Some(value) => {
                        url.push_str(&query_value(value));
                        consumed.push(name);
                    }
                    // Unresolvable placeholder stays literal
                    None => url.push_str(&rest[open..open + close_offset + 1]),
                }
                rest = &rest[open + close_offset + 1..];
            }
            None => {
                url.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    url.push_str(rest);

    let leftover: Map<String, Value> = inputs
        .iter()
        .filter(|(k, _)| !consumed.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    (url, leftover)
}

/// Render a JSON value as a URL-friendly scalar
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_url_substitutes_and_consumes() {
        let (url, leftover) = render_url(
            "https://api.example.com/weather/{city}",
            &json!({"city": "Beijing", "units": "metric"}),
        );
        assert_eq!(url, "https://api.example.com/weather/Beijing");
        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover["units"], "metric");
    }

    #[test]
    fn test_render_url_leaves_unknown_placeholders() {
        let (url, _) = render_url("https://x/{missing}", &json!({}));
        assert_eq!(url, "https://x/{missing}");
    }

    #[test]
    fn test_delay_is_exponential_with_jitter() {
        let config = InvokerConfig::default();
        let d0 = config.delay_for(0);
        let d1 = config.delay_for(1);
        assert!(d0 >= Duration::from_millis(160) && d0 <= Duration::from_millis(240));
        assert!(d1 >= Duration::from_millis(320) && d1 <= Duration::from_millis(480));
    }

    #[test]
    fn test_numeric_placeholder_rendering() {
        let (url, _) = render_url("https://x/item/{id}", &json!({"id": 42}));
        assert_eq!(url, "https://x/item/42");
    }
}
