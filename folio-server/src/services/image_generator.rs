//! Image generation API client
//!
//! Posts `{model, prompt, size, response_format: "b64_json"}` to
//! `{url}/v1/images/generations` and decodes the returned PNG.

use axum::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("folio-server/", env!("CARGO_PKG_VERSION"));

/// Image API errors
#[derive(Debug, Error)]
pub enum ImageApiError {
    #[error("Image API key not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Image API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Generates an image from a text prompt
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns PNG bytes
    async fn generate(&self, prompt: &str, size: &str) -> Result<Vec<u8>, ImageApiError>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
}

/// HTTP image generation client
pub struct HttpImageGenerator {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpImageGenerator {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Result<Self, ImageApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ImageApiError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, prompt: &str, size: &str) -> Result<Vec<u8>, ImageApiError> {
        let api_key = self.api_key.as_deref().ok_or(ImageApiError::MissingApiKey)?;

        tracing::debug!(model = %self.model, size, "Requesting image generation");

        let response = self
            .http_client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(api_key)
            .json(&GenerationRequest {
                model: &self.model,
                prompt,
                size,
                n: 1,
                response_format: "b64_json",
            })
            .send()
            .await
            .map_err(|e| ImageApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ImageApiError::ApiError(status.as_u16(), error_text));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ImageApiError::ParseError(e.to_string()))?;

        let encoded = body
            .data
            .into_iter()
            .next()
            .and_then(|image| image.b64_json)
            .ok_or_else(|| ImageApiError::ParseError("Response contained no image".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ImageApiError::ParseError(format!("Invalid base64 image: {}", e)))
    }
}
