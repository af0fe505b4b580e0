//! Image endpoints: serve, generate, delete

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use folio_common::db::assets;
use folio_common::db::Image;
use serde::Deserialize;
use std::io;
use tracing::info;

use super::chunks::owned_chunk;
use super::manuscripts::owned_manuscript;
use crate::error::{ApiError, ApiResult};
use crate::identity::AuthenticatedUser;
use crate::services::illustrator::{BatchReport, Illustrator};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateImagesRequest {
    #[serde(default)]
    pub skip_existing: bool,
}

fn illustrator(state: &AppState) -> Illustrator<'_> {
    Illustrator {
        db: &state.db,
        generator: state.images.as_ref(),
        store: &state.store,
    }
}

/// GET /api/images/:id
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_guid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let image = assets::get_image(&state.db, &image_guid).await?;

    let bytes = state
        .store
        .read_image(&image.manuscript_guid, &image.file_name)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ApiError::NotFound(format!("Image file missing: {}", image_guid)),
            _ => ApiError::Io(e),
        })?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

/// POST /api/chunks/:id/image
pub async fn generate_chunk_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chunk_guid): Path<String>,
) -> ApiResult<(StatusCode, Json<Image>)> {
    let chunk = owned_chunk(&state, &chunk_guid, &user).await?;
    let manuscript = owned_manuscript(&state, &chunk.manuscript_guid, &user).await?;

    let image = illustrator(&state).illustrate(&manuscript, &chunk).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

/// POST /api/manuscripts/:id/images/generate
///
/// Optional body `{"skip_existing": true}`.
pub async fn generate_manuscript_images(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(manuscript_guid): Path<String>,
    body: Bytes,
) -> ApiResult<Json<BatchReport>> {
    let request: GenerateImagesRequest = if body.is_empty() {
        GenerateImagesRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))?
    };

    let manuscript = owned_manuscript(&state, &manuscript_guid, &user).await?;
    info!(
        manuscript = %manuscript_guid,
        skip_existing = request.skip_existing,
        "Starting batch image generation"
    );

    let report = illustrator(&state)
        .illustrate_all(&manuscript, request.skip_existing)
        .await?;
    Ok(Json(report))
}

/// DELETE /api/images/:id
pub async fn delete_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(image_guid): Path<String>,
) -> ApiResult<StatusCode> {
    let image = assets::get_image(&state.db, &image_guid).await?;
    owned_manuscript(&state, &image.manuscript_guid, &user).await?;

    let removed = assets::delete_image(&state.db, &image_guid).await?;
    state
        .store
        .remove_image(&removed.manuscript_guid, &removed.file_name)
        .await;

    Ok(StatusCode::NO_CONTENT)
}
