//! Text-to-speech API client

use axum::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("folio-server/", env!("CARGO_PKG_VERSION"));

/// Speech API errors
#[derive(Debug, Error)]
pub enum SpeechApiError {
    #[error("Speech API key not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Speech API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Speech API returned no audio")]
    EmptyAudio,
}

/// Synthesizes narration audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Voice used when the request names none
    fn default_voice(&self) -> &str;

    /// Returns MP3 bytes
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechApiError>;
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

/// HTTP speech client posting to `{url}/v1/audio/speech`
pub struct HttpSpeechSynthesizer {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        voice: String,
    ) -> Result<Self, SpeechApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SpeechApiError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            voice,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn default_voice(&self) -> &str {
        &self.voice
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechApiError> {
        let api_key = self.api_key.as_deref().ok_or(SpeechApiError::MissingApiKey)?;

        tracing::debug!(model = %self.model, voice, chars = text.chars().count(), "Requesting speech synthesis");

        let response = self
            .http_client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(api_key)
            .json(&SpeechRequest {
                model: &self.model,
                voice,
                input: text,
            })
            .send()
            .await
            .map_err(|e| SpeechApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SpeechApiError::ApiError(status.as_u16(), error_text));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SpeechApiError::NetworkError(e.to_string()))?;

        if audio.is_empty() {
            return Err(SpeechApiError::EmptyAudio);
        }
        Ok(audio.to_vec())
    }
}
