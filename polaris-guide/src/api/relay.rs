//! Relay endpoints for browser clients
//!
//! `/api/chat` re-streams a chat answer as OpenAI-style SSE frames and
//! `/api/tts` returns synthesized speech. Errors use the flat
//! `{"error": "..."}` body that clients of these endpoints expect.

use crate::api::AppContext;
use crate::services::{ChatFragment, ChatRequest};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use polaris_common::{Speaker, TranscriptEntry};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, error, info, warn};

/// Message in the `history` shape (`role` + `content`)
#[derive(Debug, Deserialize)]
struct HistoryMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRelayBody {
    #[serde(alias = "landmarkName")]
    subject_name: Option<String>,
    question: Option<String>,
    #[serde(default)]
    prior_transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    history: Vec<HistoryMessage>,
}

impl ChatRelayBody {
    fn into_request(self) -> Option<ChatRequest> {
        let subject_name = self.subject_name.filter(|s| !s.trim().is_empty())?;
        let question = self.question.filter(|q| !q.trim().is_empty())?;

        let mut prior_transcript = self.prior_transcript;
        prior_transcript.extend(self.history.into_iter().filter_map(|m| {
            let speaker = match m.role.as_str() {
                "user" => Speaker::User,
                "assistant" => Speaker::Narrator,
                _ => return None,
            };
            Some(TranscriptEntry {
                speaker,
                text: m.content,
            })
        }));

        Some(ChatRequest {
            subject_name,
            question,
            prior_transcript,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TtsBody {
    text: Option<String>,
}

fn relay_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /api/chat - streamed answer as `data:` frames ending in `[DONE]`
///
/// An upstream failure mid-answer ends the body with an `error` event instead.
pub async fn chat(State(ctx): State<AppContext>, body: Bytes) -> Response {
    let request = serde_json::from_slice::<ChatRelayBody>(&body)
        .ok()
        .and_then(ChatRelayBody::into_request);
    let Some(request) = request else {
        return relay_error(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    info!(landmark = %request.subject_name, "Relaying chat question");

    let upstream = match ctx.chat.open_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Chat relay failed: {}", e);
            return relay_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let frames = async_stream::stream! {
        let mut upstream = upstream;
        while let Some(item) = upstream.next().await {
            match item {
                Ok(ChatFragment::Delta(content)) if !content.is_empty() => {
                    let frame = json!({ "choices": [{ "delta": { "content": content } }] });
                    yield Ok::<Event, Infallible>(Event::default().data(frame.to_string()));
                }
                Ok(ChatFragment::Delta(_)) => {}
                Ok(ChatFragment::Done) => break,
                Err(e) => {
                    // No end marker: the client must not take a cut-off answer as complete
                    warn!("Chat relay stream ended early: {}", e);
                    let frame = json!({ "error": "Stream interrupted" });
                    yield Ok(Event::default().event("error").data(frame.to_string()));
                    return;
                }
            }
        }
        debug!("Chat relay stream complete");
        yield Ok(Event::default().data("[DONE]"));
    };

    let mut response = Sse::new(frames).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// POST /api/tts - synthesized speech for `text`
pub async fn tts(State(ctx): State<AppContext>, body: Bytes) -> Response {
    let text = serde_json::from_slice::<TtsBody>(&body)
        .ok()
        .and_then(|b| b.text)
        .filter(|t| !t.trim().is_empty());
    let Some(text) = text else {
        return relay_error(StatusCode::BAD_REQUEST, "Text is required");
    };

    debug!(chars = text.len(), "Relaying speech request");

    match ctx.speech.synthesize(&text).await {
        Ok(clip) => {
            let cache = if clip.cache_hit { "HIT" } else { "MISS" };
            let content_type = HeaderValue::from_str(&clip.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("audio/mpeg"));
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (
                        header::HeaderName::from_static("x-cache"),
                        HeaderValue::from_static(cache),
                    ),
                ],
                clip.bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!("Speech relay failed: {}", e);
            relay_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate speech")
        }
    }
}
