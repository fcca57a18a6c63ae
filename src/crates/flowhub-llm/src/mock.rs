//! Scripted chat model for tests
//!
//! Returns queued responses in order, splitting each into small chunks
//! when streamed. When the script runs out it echoes the last user
//! message, which keeps simple fixtures short.

use async_stream::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{
    ChatModel, ChatRequest, ChatResponse, MessageChunk, MessageRole, TokenStream, TokenUsage,
};

/// In-memory scripted model
#[derive(Clone, Default)]
pub struct MockChatModel {
    responses: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockChatModel {
    /// Create a mock with no scripted responses (echo mode)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers with the given responses in order
    pub fn with_responses(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(Into::into).collect(),
            )),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue one more response
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().push_back(response.into());
    }

    /// Requests observed so far
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    fn next_response(&self, request: &ChatRequest) -> String {
        self.calls.lock().push(request.clone());
        if let Some(scripted) = self.responses.lock().pop_front() {
            return scripted;
        }
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ChatModel for MockChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let content = self.next_response(&request);
        let usage = TokenUsage {
            prompt_tokens: 7,
            completion_tokens: content.len() as u64 / 4 + 1,
        };
        Ok(ChatResponse {
            content,
            usage: Some(usage),
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let content = self.next_response(&request);
        let usage = TokenUsage {
            prompt_tokens: 7,
            completion_tokens: content.len() as u64 / 4 + 1,
        };

        let chunks: Vec<String> = content
            .as_bytes()
            .chunks(8)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();

        let token_stream = stream! {
            for chunk in chunks {
                yield Ok(MessageChunk::delta(chunk));
            }
            yield Ok(MessageChunk::done(Some(usage)));
        };
        Ok(Box::pin(token_stream))
    }
}
