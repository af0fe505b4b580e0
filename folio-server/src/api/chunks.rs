//! Chunk endpoints: reader paging, editing and reordering

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use folio_common::db::chunks::{self, ChunkEdit, NewChunk};
use folio_common::db::manuscripts;
use folio_common::db::{Chunk, ChunkWithAssets};
use folio_common::Direction;
use serde::{Deserialize, Serialize};

use super::manuscripts::owned_manuscript;
use crate::error::ApiResult;
use crate::identity::AuthenticatedUser;
use crate::pagination::calculate_pagination;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ChunkPageResponse {
    pub manuscript_id: String,
    pub page: i64,
    pub page_size: i64,
    pub total_chunks: i64,
    pub total_pages: i64,
    pub chunks: Vec<ChunkWithAssets>,
}

#[derive(Debug, Deserialize)]
pub struct InsertChunkRequest {
    pub position: i64,
    pub text: String,
    #[serde(default)]
    pub heading_level1: Option<String>,
    #[serde(default)]
    pub heading_level2: Option<String>,
}

/// Omitted fields are left unchanged; an empty heading clears it
#[derive(Debug, Deserialize)]
pub struct UpdateChunkRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub heading_level1: Option<String>,
    #[serde(default)]
    pub heading_level2: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub direction: String,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub first_chunk_id: String,
    pub second_chunk_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SplitRequest {
    pub chunk_id: String,
    /// Character offset of the cut
    pub split_point: usize,
}

#[derive(Debug, Serialize)]
pub struct SplitResponse {
    pub head: Chunk,
    pub tail: Chunk,
}

/// Load a chunk and require the caller to own its manuscript
pub(crate) async fn owned_chunk(
    state: &AppState,
    chunk_guid: &str,
    user: &AuthenticatedUser,
) -> ApiResult<Chunk> {
    let chunk = chunks::get_chunk(&state.db, chunk_guid).await?;
    owned_manuscript(state, &chunk.manuscript_guid, user).await?;
    Ok(chunk)
}

/// GET /api/manuscripts/:id/chunks?page=&page_size=
pub async fn list_chunks(
    State(state): State<AppState>,
    Path(manuscript_guid): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ChunkPageResponse>> {
    // 404 for unknown manuscripts rather than an empty page
    manuscripts::get_manuscript(&state.db, &manuscript_guid).await?;

    let total_chunks = manuscripts::count_chunks(&state.db, &manuscript_guid).await?;
    let pagination = calculate_pagination(total_chunks, query.page, query.page_size);

    let page = chunks::list_chunk_page(
        &state.db,
        &manuscript_guid,
        pagination.page_size,
        pagination.offset,
    )
    .await?;

    Ok(Json(ChunkPageResponse {
        manuscript_id: manuscript_guid,
        page: pagination.page,
        page_size: pagination.page_size,
        total_chunks,
        total_pages: pagination.total_pages,
        chunks: page,
    }))
}

/// GET /api/chunks/:id
pub async fn get_chunk(
    State(state): State<AppState>,
    Path(chunk_guid): Path<String>,
) -> ApiResult<Json<Chunk>> {
    Ok(Json(chunks::get_chunk(&state.db, &chunk_guid).await?))
}

/// POST /api/manuscripts/:id/chunks
pub async fn insert_chunk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(manuscript_guid): Path<String>,
    Json(request): Json<InsertChunkRequest>,
) -> ApiResult<(StatusCode, Json<Chunk>)> {
    owned_manuscript(&state, &manuscript_guid, &user).await?;

    let chunk = chunks::insert_chunk(
        &state.db,
        &manuscript_guid,
        NewChunk {
            position: request.position,
            text: request.text,
            heading_level1: request.heading_level1,
            heading_level2: request.heading_level2,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(chunk)))
}

/// PUT /api/chunks/:id
pub async fn update_chunk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chunk_guid): Path<String>,
    Json(request): Json<UpdateChunkRequest>,
) -> ApiResult<Json<Chunk>> {
    owned_chunk(&state, &chunk_guid, &user).await?;

    let chunk = chunks::update_chunk(
        &state.db,
        &chunk_guid,
        ChunkEdit {
            text: request.text,
            heading_level1: request.heading_level1,
            heading_level2: request.heading_level2,
        },
    )
    .await?;

    Ok(Json(chunk))
}

/// DELETE /api/chunks/:id
pub async fn delete_chunk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chunk_guid): Path<String>,
) -> ApiResult<StatusCode> {
    owned_chunk(&state, &chunk_guid, &user).await?;
    chunks::delete_chunk(&state.db, &chunk_guid).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/chunks/:id/reorder
pub async fn reorder_chunk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chunk_guid): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<Json<Chunk>> {
    let direction: Direction = request.direction.parse()?;
    owned_chunk(&state, &chunk_guid, &user).await?;

    let chunk = chunks::reorder_chunk(&state.db, &chunk_guid, direction).await?;
    Ok(Json(chunk))
}

/// POST /api/chunks/merge
pub async fn merge_chunks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Json<Chunk>> {
    owned_chunk(&state, &request.first_chunk_id, &user).await?;

    let merged = chunks::merge_chunks(&state.db, &request.first_chunk_id, &request.second_chunk_id).await?;
    Ok(Json(merged))
}

/// POST /api/chunks/split
pub async fn split_chunk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<SplitRequest>,
) -> ApiResult<(StatusCode, Json<SplitResponse>)> {
    owned_chunk(&state, &request.chunk_id, &user).await?;

    let (head, tail) = chunks::split_chunk(&state.db, &request.chunk_id, request.split_point).await?;
    Ok((StatusCode::CREATED, Json(SplitResponse { head, tail })))
}
