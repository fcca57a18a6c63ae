//! HTTP chat-completions client (OpenAI-compatible wire format)
//!
//! Streaming uses the provider's SSE framing: `data: {json}` lines with
//! a `data: [DONE]` sentinel. Partial lines across network chunks are
//! reassembled before parsing.

use async_stream::stream;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::types::{
    ChatModel, ChatRequest, ChatResponse, MessageChunk, MessageRole, TokenStream, TokenUsage,
};

/// Chat-completions API client
#[derive(Clone)]
pub struct ChatClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: Option<WireStreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireStreamEvent {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}

impl ChatClient {
    /// Create a new client from configuration
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(LlmError::Config("base_url must not be empty".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self { config, client })
    }

    fn role_str(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<WireMessage> = request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: Self::role_str(m.role),
                content: &m.content,
            })
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model),
            "messages": messages,
            "stream": stream,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if request.json_output {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        let message = message.chars().take(512).collect::<String>();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LlmError::Auth(message)),
            StatusCode::TOO_MANY_REQUESTS => Err(LlmError::RateLimited(message)),
            _ => Err(LlmError::Status {
                status: status.as_u16(),
                message,
            }),
        }
    }

    fn map_transport(err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else {
            LlmError::Http(err)
        }
    }
}

#[async_trait::async_trait]
impl ChatModel for ChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = self.request_body(&request, false);
        debug!(model = %body["model"], "sending chat request");

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let response = Self::check_status(response).await?;

        let wire: WireResponse = response.json().await.map_err(Self::map_transport)?;
        let content = wire
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        Ok(ChatResponse {
            content,
            usage: wire.usage.map(TokenUsage::from),
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let body = self.request_body(&request, true);
        debug!(model = %body["model"], "opening chat stream");

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let response = Self::check_status(response).await?;

        let mut bytes = response.bytes_stream();
        let token_stream = stream! {
            let mut buffer = String::new();
            let mut usage: Option<TokenUsage> = None;
            let mut finished = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(Self::map_transport(e));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete lines; keep the partial tail buffered.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        finished = true;
                        yield Ok(MessageChunk::done(usage.take()));
                        break;
                    }

                    match serde_json::from_str::<WireStreamEvent>(data) {
                        Ok(event) => {
                            if let Some(u) = event.usage {
                                usage = Some(u.into());
                            }
                            for choice in event.choices {
                                // finish_reason arrives on the last delta;
                                // the [DONE] sentinel closes the stream.
                                let _ = choice.finish_reason;
                                if let Some(content) =
                                    choice.delta.and_then(|d| d.content).filter(|c| !c.is_empty())
                                {
                                    yield Ok(MessageChunk::delta(content));
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(LlmError::InvalidResponse(format!(
                                "bad stream frame: {}", e
                            )));
                            return;
                        }
                    }
                }
                if finished {
                    break;
                }
            }

            if !finished {
                // Stream ended without a [DONE] sentinel; still terminate
                // cleanly so callers observe completion.
                yield Ok(MessageChunk::done(usage.take()));
            }
        };

        Ok(Box::pin(token_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    #[test]
    fn test_request_body_shape() {
        let client = ChatClient::new(LlmConfig::new("key", "https://api.test/v1", "m1")).unwrap();
        let request = ChatRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
        ])
        .with_temperature(0.5)
        .with_json_output(true);

        let body = client.request_body(&request, true);
        assert_eq!(body["model"], "m1");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_model_override() {
        let client = ChatClient::new(LlmConfig::new("key", "https://api.test/v1", "m1")).unwrap();
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]).with_model("m2");
        let body = client.request_body(&request, false);
        assert_eq!(body["model"], "m2");
    }
}
