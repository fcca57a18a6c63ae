//! flowhub service crate
//!
//! Ties the engine, skills, LLM client and task fabric together behind
//! an HTTP API: SQLite persistence with version history and optimistic
//! concurrency, per-user quotas and chat sessions, execution lifecycle
//! with SSE streaming, and the automation fabric's composition root.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod fabric;
pub mod services;
pub mod shutdown;

pub use config::ServerConfig;
