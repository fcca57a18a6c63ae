//! Chat-completions provider client for flowhub
//!
//! A minimal, provider-agnostic interface to a chat-completions endpoint
//! (OpenAI-compatible wire format), used by LLM workflow nodes and by
//! the catalogue enrichment tasks.
//!
//! - [`ChatModel`] - the trait engine nodes program against
//! - [`ChatClient`] - HTTP implementation with token streaming
//! - [`MockChatModel`] - scripted model for tests
//! - [`json_repair`] - one-shot repair pass for `json_output` nodes

pub mod client;
pub mod config;
pub mod error;
pub mod json_repair;
pub mod mock;
pub mod types;

pub use client::ChatClient;
pub use config::LlmConfig;
pub use error::{LlmError, Result};
pub use mock::MockChatModel;
pub use types::{
    ChatMessage, ChatModel, ChatRequest, ChatResponse, MessageChunk, MessageRole, TokenStream,
    TokenUsage,
};
