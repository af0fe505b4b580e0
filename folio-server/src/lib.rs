//! folio-server library
//!
//! HTTP service for manuscript publishing: upload and segmentation, chunk
//! editing, AI illustration and narration, reader paging, and export.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod archive;
pub mod auth;
pub mod epub;
pub mod error;
pub mod identity;
pub mod pagination;
pub mod services;
pub mod storage;

use identity::IdentityProvider;
use services::{DocumentConverter, ImageGenerator, SpeechSynthesizer};
use storage::AssetStore;

/// Request bodies above this size are rejected
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Settings handlers read at request time
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Base URL for absolute image links in Markdown exports
    pub public_base_url: String,
    /// Chunks covered by one image archive part
    pub images_per_archive: usize,
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub identity: Arc<dyn IdentityProvider>,
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub converter: Arc<dyn DocumentConverter>,
    pub store: AssetStore,
    pub settings: ServerSettings,
}

/// Build application router
///
/// Reader endpoints are public; everything that changes data requires a
/// bearer token and ownership of the manuscript.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{delete, get, post, put};

    let protected = Router::new()
        .route(
            "/api/manuscripts",
            get(api::manuscripts::list_manuscripts).post(api::manuscripts::create_manuscript),
        )
        .route(
            "/api/manuscripts/:id",
            put(api::manuscripts::update_manuscript).delete(api::manuscripts::delete_manuscript),
        )
        .route("/api/manuscripts/:id/chunks", post(api::chunks::insert_chunk))
        .route(
            "/api/manuscripts/:id/images/generate",
            post(api::images::generate_manuscript_images),
        )
        .route("/api/chunks/merge", post(api::chunks::merge_chunks))
        .route("/api/chunks/split", post(api::chunks::split_chunk))
        .route(
            "/api/chunks/:id",
            put(api::chunks::update_chunk).delete(api::chunks::delete_chunk),
        )
        .route("/api/chunks/:id/reorder", post(api::chunks::reorder_chunk))
        .route("/api/chunks/:id/image", post(api::images::generate_chunk_image))
        .route("/api/chunks/:id/narration", post(api::narration::create_narration))
        .route("/api/images/:id", delete(api::images::delete_image))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/markdown/validate", post(api::manuscripts::validate_markdown))
        .route("/api/manuscripts/:id", get(api::manuscripts::get_manuscript))
        .route("/api/manuscripts/:id/chunks", get(api::chunks::list_chunks))
        .route("/api/manuscripts/:id/export", get(api::export::export_manuscript))
        .route(
            "/api/manuscripts/:id/download-images",
            get(api::export::download_images),
        )
        .route("/api/chunks/:id", get(api::chunks::get_chunk))
        .route("/api/chunks/:id/narration", get(api::narration::get_narration))
        .route("/api/images/:id", get(api::images::get_image))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
