//! OpenAI-compatible `/chat/completions` client.
//!
//! Streaming requests are read as server-sent events until the `[DONE]`
//! sentinel; each frame's first choice delta becomes one
//! [`GenerationChunk`]. Decisions use JSON mode and parse the reply content.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, instrument, trace};

use crate::error::{ServiceError, ServiceResult};
use crate::message::{ContentPart, Message, MessageContent};
use crate::services::{ChunkStream, DecisionService, GenerationChunk, GenerationService};

/// Sentinel data frame closing a streamed completion.
const DONE: &str = "[DONE]";

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn post(&self, body: &Value) -> ServiceResult<reqwest::Response> {
        let mut request = self.http.post(self.endpoint()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        Ok(request.send().await?.error_for_status()?)
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Convert history into the chat completion `messages` array.
pub fn wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let content = match &message.content {
                MessageContent::Text(text) => Value::String(text.clone()),
                MessageContent::Parts(parts) => Value::Array(
                    parts
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text { text } => json!({"type": "text", "text": text}),
                            ContentPart::Image { image_ref } => {
                                json!({"type": "image_url", "image_url": {"url": image_ref}})
                            }
                        })
                        .collect(),
                ),
            };
            let mut wire = json!({ "role": message.role, "content": content });
            if let Some(name) = &message.name {
                wire["name"] = Value::String(name.clone());
            }
            wire
        })
        .collect()
}

/// Parse one streamed data frame. Frames without text or reasoning yield
/// `None`.
pub fn parse_stream_frame(data: &str) -> ServiceResult<Option<GenerationChunk>> {
    let frame: Value = serde_json::from_str(data)
        .map_err(|e| ServiceError::Stream(format!("invalid frame {data:?}: {e}")))?;

    if let Some(error) = frame.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ServiceError::Stream(message));
    }

    let delta = &frame["choices"][0]["delta"];
    let text = delta["content"].as_str().map(str::to_string);
    let reasoning = delta["reasoning_content"].as_str().map(str::to_string);
    if text.is_none() && reasoning.is_none() {
        return Ok(None);
    }
    Ok(Some(GenerationChunk { text, reasoning }))
}

/// Extract the JSON document from a non-streamed completion body.
pub fn parse_decision_body(body: &Value) -> ServiceResult<Value> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| ServiceError::MalformedResponse(format!("no message content in {body}")))?;
    let cleaned = crate::plan::strip_code_fences(content);
    serde_json::from_str(cleaned)
        .map_err(|e| ServiceError::MalformedResponse(format!("{content:?} is not JSON: {e}")))
}

#[async_trait]
impl GenerationService for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn stream(&self, messages: &[Message]) -> ServiceResult<ChunkStream> {
        let body = json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "stream": true,
        });
        let response = self.post(&body).await?;
        debug!(status = %response.status(), "generation stream opened");

        let chunks = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(frame) if frame.data.trim() == DONE))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(frame) => {
                        trace!(data = %frame.data, "sse frame");
                        parse_stream_frame(&frame.data).transpose()
                    }
                    Err(e) => Some(Err(ServiceError::Stream(e.to_string()))),
                })
            });
        Ok(Box::pin(chunks))
    }
}

#[async_trait]
impl DecisionService for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn decide(&self, messages: &[Message], schema: &Value) -> ServiceResult<Value> {
        let mut wire = wire_messages(messages);
        wire.push(json!({
            "role": "system",
            "content": format!("Reply with a single JSON object matching this JSON schema:\n{schema}"),
        }));
        let body = json!({
            "model": self.model,
            "messages": wire,
            "response_format": {"type": "json_object"},
        });
        let response: Value = self.post(&body).await?.json().await?;
        parse_decision_body(&response)
    }
}
