//! Manuscript endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use folio_common::db::manuscripts::{self, NewManuscript};
use folio_common::db::{ImageSettings, Manuscript, ManuscriptSummary};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::ensure_owner;
use crate::error::{ApiError, ApiResult};
use crate::identity::AuthenticatedUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateManuscriptRequest {
    pub title: String,
    pub markdown: String,
    #[serde(default)]
    pub image_settings: Option<ImageSettings>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateManuscriptRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_settings: Option<ImageSettings>,
}

/// Manuscript with its chunk count
#[derive(Debug, Serialize)]
pub struct ManuscriptResponse {
    #[serde(flatten)]
    pub manuscript: Manuscript,
    pub chunk_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
}

/// Load a manuscript and require the caller to own it
pub(crate) async fn owned_manuscript(
    state: &AppState,
    manuscript_guid: &str,
    user: &AuthenticatedUser,
) -> ApiResult<Manuscript> {
    let manuscript = manuscripts::get_manuscript(&state.db, manuscript_guid).await?;
    ensure_owner(&manuscript, user)?;
    Ok(manuscript)
}

/// GET /api/manuscripts
pub async fn list_manuscripts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<Vec<ManuscriptSummary>>> {
    let listing = manuscripts::list_manuscripts_by_author(&state.db, &user.id).await?;
    Ok(Json(listing))
}

/// POST /api/manuscripts
///
/// Stores the manuscript and segments its markdown into chunks.
pub async fn create_manuscript(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateManuscriptRequest>,
) -> ApiResult<(StatusCode, Json<ManuscriptResponse>)> {
    if request.markdown.trim().is_empty() {
        return Err(ApiError::Validation("Manuscript markdown must not be empty".to_string()));
    }

    let (manuscript, chunk_count) = manuscripts::create_manuscript(
        &state.db,
        NewManuscript {
            title: request.title,
            author_id: user.id,
            markdown: request.markdown,
            image_settings: request.image_settings.unwrap_or_default(),
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ManuscriptResponse {
            manuscript,
            chunk_count,
        }),
    ))
}

/// GET /api/manuscripts/:id
pub async fn get_manuscript(
    State(state): State<AppState>,
    Path(manuscript_guid): Path<String>,
) -> ApiResult<Json<ManuscriptResponse>> {
    let manuscript = manuscripts::get_manuscript(&state.db, &manuscript_guid).await?;
    let chunk_count = manuscripts::count_chunks(&state.db, &manuscript_guid).await?;
    Ok(Json(ManuscriptResponse {
        manuscript,
        chunk_count,
    }))
}

/// PUT /api/manuscripts/:id
pub async fn update_manuscript(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(manuscript_guid): Path<String>,
    Json(request): Json<UpdateManuscriptRequest>,
) -> ApiResult<Json<ManuscriptResponse>> {
    owned_manuscript(&state, &manuscript_guid, &user).await?;

    let manuscript = manuscripts::update_manuscript(
        &state.db,
        &manuscript_guid,
        request.title,
        request.image_settings,
    )
    .await?;
    let chunk_count = manuscripts::count_chunks(&state.db, &manuscript_guid).await?;

    Ok(Json(ManuscriptResponse {
        manuscript,
        chunk_count,
    }))
}

/// DELETE /api/manuscripts/:id
///
/// Chunks, images and narrations go with the row; asset files are removed
/// afterwards on a best-effort basis.
pub async fn delete_manuscript(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(manuscript_guid): Path<String>,
) -> ApiResult<StatusCode> {
    owned_manuscript(&state, &manuscript_guid, &user).await?;

    manuscripts::delete_manuscript(&state.db, &manuscript_guid).await?;
    state.store.remove_manuscript(&manuscript_guid).await;

    info!(manuscript = %manuscript_guid, user = %user.id, "Manuscript deleted with its assets");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/markdown/validate
///
/// Body is the raw markdown.
pub async fn validate_markdown(body: Bytes) -> Json<ValidationResponse> {
    Json(ValidationResponse {
        valid: folio_common::validate_markdown(&body),
    })
}
