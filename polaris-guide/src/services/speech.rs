//! Text-to-speech service

use crate::error::{Error, Result};
use crate::services::chat::error_message_from_body;
use async_trait::async_trait;
use bytes::Bytes;
use polaris_common::config::OpenAiConfig;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Synthesized audio for one block of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechClip {
    pub bytes: Bytes,
    /// MIME type, e.g. `audio/mpeg`
    pub content_type: String,
    /// Served from a cache instead of being synthesized; informational only
    pub cache_hit: bool,
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesize `text`; dropping the future abandons the request
    async fn synthesize(&self, text: &str) -> Result<SpeechClip>;
}

/// Client for an OpenAI-compatible `/audio/speech` endpoint
pub struct OpenAiSpeech {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiSpeech {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl SpeechService for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip> {
        let url = format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.tts_model,
            "voice": self.config.voice,
            "input": text,
            "response_format": "mp3",
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::SpeechService(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::SpeechService(error_message_from_body(status, &text)));
        }

        let cache_hit = response
            .headers()
            .get("x-cache")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("HIT"))
            .unwrap_or(false);
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SpeechService(format!("reading audio failed: {}", e)))?;

        debug!(bytes = bytes.len(), cache_hit, "Speech synthesized");

        Ok(SpeechClip {
            bytes,
            content_type,
            cache_hit,
        })
    }
}
