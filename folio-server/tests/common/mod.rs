//! Shared helpers for folio-server integration tests
//!
//! The app runs against an in-memory database, a temporary asset folder and
//! fake external services.

#![allow(dead_code)]

use axum::{
    async_trait,
    body::Body,
    http::{header, Request},
    Router,
};
use folio_common::db::init_in_memory;
use folio_server::identity::{AuthenticatedUser, IdentityError, IdentityProvider};
use folio_server::services::converter::{ConversionError, DocumentConverter};
use folio_server::services::image_generator::{ImageApiError, ImageGenerator};
use folio_server::services::speech::{SpeechApiError, SpeechSynthesizer};
use folio_server::storage::AssetStore;
use folio_server::{build_router, AppState, ServerSettings};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const ALICE: &str = "alice-token";
pub const BOB: &str = "bob-token";

/// Bytes returned by the fake image generator
pub const FAKE_PNG: &[u8] = b"\x89PNG fake image";

/// Prompts containing this text make the fake image generator fail
pub const FAIL_MARKER: &str = "FAILME";

pub struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, IdentityError> {
        match token {
            ALICE => Ok(AuthenticatedUser {
                id: "alice".to_string(),
                email: Some("alice@example.com".to_string()),
            }),
            BOB => Ok(AuthenticatedUser {
                id: "bob".to_string(),
                email: None,
            }),
            _ => Err(IdentityError::Rejected),
        }
    }
}

pub struct FakeImages;

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str, _size: &str) -> Result<Vec<u8>, ImageApiError> {
        if prompt.contains(FAIL_MARKER) {
            return Err(ImageApiError::ApiError(400, "content policy".to_string()));
        }
        Ok(FAKE_PNG.to_vec())
    }
}

pub struct FakeSpeech;

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    fn default_voice(&self) -> &str {
        "alloy"
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SpeechApiError> {
        Ok(format!("MP3[{}]:{}", voice, text).into_bytes())
    }
}

/// Echoes the Markdown it was given so tests can inspect it
pub struct FakeConverter;

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn markdown_to_docx(&self, markdown: &str, _working_dir: &Path) -> Result<Vec<u8>, ConversionError> {
        Ok(format!("DOCX\n{}", markdown).into_bytes())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub assets: TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with_archive_size(50).await
}

pub async fn setup_app_with_archive_size(images_per_archive: usize) -> TestApp {
    let db = init_in_memory().await.expect("Should create in-memory database");
    let assets = tempfile::tempdir().expect("Should create asset folder");

    let state = AppState {
        db,
        identity: Arc::new(FakeIdentity),
        images: Arc::new(FakeImages),
        speech: Arc::new(FakeSpeech),
        converter: Arc::new(FakeConverter),
        store: AssetStore::new(assets.path().to_path_buf()),
        settings: ServerSettings {
            public_base_url: "http://folio.test".to_string(),
            images_per_archive,
        },
    };

    TestApp {
        router: build_router(state.clone()),
        state,
        assets,
    }
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn authed_json(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn extract_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

pub async fn extract_json(body: Body) -> Value {
    serde_json::from_slice(&extract_bytes(body).await).expect("Should parse JSON")
}
