//! Bearer token validation against the hosted identity provider

use axum::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("folio-server/", env!("CARGO_PKG_VERSION"));

/// Identity provider errors
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Token unknown, expired or revoked
    #[error("Token rejected by identity provider")]
    Rejected,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Identity provider error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// The caller behind a validated bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves bearer tokens to users
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, IdentityError>;
}

/// Identity provider reached over HTTP (`GET {url}/auth/v1/user`)
pub struct HttpIdentityProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| IdentityError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, IdentityError> {
        let mut request = self
            .http_client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IdentityError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(IdentityError::Rejected);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IdentityError::ApiError(status.as_u16(), error_text));
        }

        let user: AuthenticatedUser = response
            .json()
            .await
            .map_err(|e| IdentityError::ParseError(e.to_string()))?;

        debug!(user = %user.id, "Token validated");
        Ok(user)
    }
}
