//! Narration endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use folio_common::db::assets;
use folio_common::db::Narration;
use serde::Deserialize;
use std::io;
use tracing::info;

use super::chunks::owned_chunk;
use crate::error::{ApiError, ApiResult};
use crate::identity::AuthenticatedUser;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NarrationRequest {
    #[serde(default)]
    pub voice: Option<String>,
}

/// POST /api/chunks/:id/narration
///
/// Optional body `{"voice": "..."}`; the configured voice is used otherwise.
pub async fn create_narration(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chunk_guid): Path<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Narration>)> {
    let request: NarrationRequest = if body.is_empty() {
        NarrationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))?
    };

    let chunk = owned_chunk(&state, &chunk_guid, &user).await?;
    let voice = request
        .voice
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| state.speech.default_voice().to_string());

    let audio = state.speech.synthesize(&chunk.text, &voice).await?;
    let file_name = state.store.save_audio(&chunk.manuscript_guid, &audio).await?;

    let narration = assets::insert_narration(&state.db, &chunk.guid, &file_name, &voice).await?;
    info!(chunk = %chunk.guid, narration = %narration.guid, voice = %voice, "Narration created");

    Ok((StatusCode::CREATED, Json(narration)))
}

/// GET /api/chunks/:id/narration
///
/// Streams the most recent narration of the chunk.
pub async fn get_narration(
    State(state): State<AppState>,
    Path(chunk_guid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let narration = assets::latest_narration_for_chunk(&state.db, &chunk_guid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No narration for chunk {}", chunk_guid)))?;

    let bytes = state
        .store
        .read_audio(&narration.manuscript_guid, &narration.file_name)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ApiError::NotFound(format!("Narration file missing: {}", narration.guid))
            }
            _ => ApiError::Io(e),
        })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], bytes))
}
