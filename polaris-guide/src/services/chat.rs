//! Chat completion service
//!
//! The narration session only sees [`ChatService`]: a request carrying the
//! landmark, the question and the prior transcript, answered by a stream of
//! text fragments ending in [`ChatFragment::Done`]. [`OpenAiChat`] implements
//! it against an OpenAI-compatible `/chat/completions` endpoint.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use polaris_common::config::OpenAiConfig;
use polaris_common::{Speaker, TranscriptEntry};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// Question about a landmark, with the conversation so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub subject_name: String,
    pub question: String,
    #[serde(default)]
    pub prior_transcript: Vec<TranscriptEntry>,
}

/// One item of a streamed answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatFragment {
    /// Incremental answer text
    Delta(String),
    /// Explicit end-of-stream marker
    Done,
}

/// Streamed answer; dropping it aborts the underlying request
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatFragment>> + Send>>;

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Start a streamed answer
    ///
    /// Resolves once the service has accepted the request; a non-success
    /// status is reported here as [`Error::ChatService`].
    async fn open_stream(&self, request: ChatRequest) -> Result<ChatStream>;
}

/// Incremental Server-Sent Events decoder
///
/// Network chunks may end anywhere, including inside a line or a multi-byte
/// character, so bytes are buffered until a full line is available. Each
/// blank line dispatches the `data` lines collected for that event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the data payload of every completed event
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            self.handle_line(&line, &mut events);
        }
        events
    }

    /// Flush an event left open when the stream ends without a blank line
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            let mut ignored = Vec::new();
            self.handle_line(&line, &mut ignored);
        }
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data).join("\n"))
        }
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(std::mem::take(&mut self.data).join("\n"));
            }
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // Comments (":") and other fields (event, id, retry) carry nothing we use
    }
}

/// Interpretation of one `data:` payload from an OpenAI-style stream
#[derive(Debug, PartialEq, Eq)]
pub enum CompletionPayload {
    Done,
    Delta(String),
    /// Valid frame without text (role announcements, finish reasons)
    Empty,
    /// `{"error": ...}` frame; the answer is incomplete
    Error(String),
    Malformed,
}

/// Parse a `data:` payload: `[DONE]` or `{"choices":[{"delta":{"content":..}}]}`
pub fn parse_completion_payload(payload: &str) -> CompletionPayload {
    let payload = payload.trim();
    if payload == "[DONE]" {
        return CompletionPayload::Done;
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(value) if !value["error"].is_null() => {
            let message = match &value["error"] {
                Value::String(s) => s.clone(),
                other => other["message"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string()),
            };
            CompletionPayload::Error(message)
        }
        Ok(value) => match value["choices"][0]["delta"]["content"].as_str() {
            Some(text) if !text.is_empty() => CompletionPayload::Delta(text.to_string()),
            _ => CompletionPayload::Empty,
        },
        Err(_) => CompletionPayload::Malformed,
    }
}

/// Turn a byte stream of OpenAI-style SSE frames into chat fragments
pub fn decode_completion_stream<S, E>(body: S) -> ChatStream
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(body);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::ChatService(format!("stream interrupted: {}", e)));
                    return;
                }
            };

            for payload in decoder.push(&chunk) {
                match parse_completion_payload(&payload) {
                    CompletionPayload::Done => {
                        yield Ok(ChatFragment::Done);
                        return;
                    }
                    CompletionPayload::Delta(text) => yield Ok(ChatFragment::Delta(text)),
                    CompletionPayload::Empty => {}
                    CompletionPayload::Error(message) => {
                        yield Err(Error::ChatService(format!("stream failed: {}", message)));
                        return;
                    }
                    CompletionPayload::Malformed => {
                        debug!("Skipping malformed completion frame: {}", payload);
                    }
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            if let CompletionPayload::Delta(text) = parse_completion_payload(&payload) {
                yield Ok(ChatFragment::Delta(text));
            }
        }
        debug!("Completion stream closed without end marker");
        yield Ok(ChatFragment::Done);
    };

    Box::pin(stream)
}

/// Extract a readable message from an error body (`{error: string}` or `{error: {message}}`)
pub(crate) fn error_message_from_body(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        match &v["error"] {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("message").and_then(|m| m.as_str()).map(str::to_string),
            _ => None,
        }
    });
    match detail {
        Some(detail) => format!("{}: {}", status, detail),
        None => status.to_string(),
    }
}

/// Streaming client for an OpenAI-compatible chat completion API
pub struct OpenAiChat {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        // No overall timeout: answers stream for as long as the model talks
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        if config.api_key.is_none() {
            warn!("No OpenAI API key configured; questions will fail until one is set");
        }

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Message list: system prompt, prior turns, then the framed question
    pub fn build_messages(&self, request: &ChatRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.prior_transcript.len() + 2);
        messages.push(json!({ "role": "system", "content": self.config.system_prompt }));

        for entry in &request.prior_transcript {
            let role = match entry.speaker {
                Speaker::User => "user",
                Speaker::Narrator => "assistant",
            };
            if !entry.text.is_empty() {
                messages.push(json!({ "role": role, "content": entry.text }));
            }
        }

        messages.push(json!({
            "role": "user",
            "content": format!("Regarding {}: {}", request.subject_name, request.question),
        }));
        messages
    }
}

#[async_trait]
impl ChatService for OpenAiChat {
    async fn open_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.chat_model,
            "messages": self.build_messages(&request),
            "stream": true,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        debug!(landmark = %request.subject_name, "Opening chat completion stream");

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::ChatService(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::ChatService(error_message_from_body(status, &text)));
        }

        Ok(decode_completion_stream(response.bytes_stream()))
    }
}
