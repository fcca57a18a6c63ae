//! Skill registry and HTTP invoker
//!
//! Skills are declarative wrappers around external HTTP capabilities.
//! The engine resolves a `skill_id` through a [`SkillRegistry`], binds
//! node inputs against the skill's input schema, and dispatches the
//! call through [`SkillInvoker`], which enforces deadlines, bounded
//! retries with backoff, credential redaction and output-schema checks.

pub mod error;
pub mod invoker;
pub mod registry;
pub mod schema;
pub mod secrets;

pub use error::{Result, SkillError};
pub use invoker::{InvokerConfig, SkillInvoker};
pub use registry::{AuthKind, HttpMethod, InMemorySkillRegistry, Skill, SkillRegistry};
pub use secrets::{EnvSecretStore, SecretStore, StaticSecretStore};
