//! Export and image archive endpoints

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::IntoResponse,
};
use folio_common::db::assets::latest_images_in_range;
use folio_common::db::chunks::list_chunks;
use folio_common::db::manuscripts::{count_chunks, get_manuscript};
use folio_common::db::Manuscript;
use folio_common::export::{
    self, attachment_filename, sanitize_file_stem, ExportContext, ExportEntry, ImageRef,
};
use folio_common::ExportFormat;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::archive::{build_archive, temp_file_stream, ArchiveEntry, ArchivePart};
use crate::epub::{build_epub, EpubBook, EpubImage};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const TOTAL_CHUNKS_HEADER: HeaderName = HeaderName::from_static("x-total-chunks");
const NEXT_CHUNK_HEADER: HeaderName = HeaderName::from_static("x-next-chunk");

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub chunk: Option<i64>,
}

/// GET /api/manuscripts/:id/export?format=markdown|epub|docx
///
/// Defaults to Markdown.
pub async fn export_manuscript(
    State(state): State<AppState>,
    Path(manuscript_guid): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    let format: ExportFormat = match query.format.as_deref() {
        Some(value) => value.parse()?,
        None => ExportFormat::Markdown,
    };

    let manuscript = get_manuscript(&state.db, &manuscript_guid).await?;
    let entries = export_entries(&state, &manuscript).await?;
    let ctx = ExportContext {
        title: manuscript.title.clone(),
        manuscript_guid: manuscript.guid.clone(),
        public_base_url: state.settings.public_base_url.clone(),
    };

    let document = match format {
        ExportFormat::Markdown => export::compile_markdown(&ctx, &entries, format).into_bytes(),
        ExportFormat::Docx => {
            let markdown = export::compile_markdown(&ctx, &entries, format);
            state
                .converter
                .markdown_to_docx(&markdown, state.store.root())
                .await?
        }
        ExportFormat::Epub => epub_bytes(&state, &ctx, entries).await?,
    };

    info!(
        manuscript = %manuscript.guid,
        format = format.extension(),
        bytes = document.len(),
        "Exported manuscript"
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        attachment(&attachment_filename(&manuscript.title, format))?,
    );

    Ok((headers, document))
}

/// Chunks in order with their latest image, skipping images missing on disk
async fn export_entries(state: &AppState, manuscript: &Manuscript) -> ApiResult<Vec<ExportEntry>> {
    let chunks = list_chunks(&state.db, &manuscript.guid).await?;
    let mut images: HashMap<String, ImageRef> = HashMap::new();

    for image in latest_images_in_range(&state.db, &manuscript.guid, 0, chunks.len() as i64).await? {
        if state.store.image_exists(&manuscript.guid, &image.file_name).await {
            images.insert(
                image.chunk_guid,
                ImageRef {
                    image_guid: image.image_guid,
                    file_name: image.file_name,
                },
            );
        } else {
            warn!(
                chunk = %image.chunk_guid,
                image = %image.image_guid,
                "Image file missing, exporting chunk without it"
            );
        }
    }

    Ok(chunks
        .into_iter()
        .map(|chunk| {
            let image = images.remove(&chunk.guid);
            ExportEntry { chunk, image }
        })
        .collect())
}

/// Package an EPUB; images that cannot be read are left out of the book
async fn epub_bytes(state: &AppState, ctx: &ExportContext, mut entries: Vec<ExportEntry>) -> ApiResult<Vec<u8>> {
    let mut images = Vec::new();
    for entry in entries.iter_mut() {
        let Some(image) = entry.image.as_ref() else {
            continue;
        };
        match state.store.read_image(&ctx.manuscript_guid, &image.file_name).await {
            Ok(data) => images.push(EpubImage {
                file_name: image.file_name.clone(),
                data,
            }),
            Err(e) => {
                warn!(
                    chunk = %entry.chunk.guid,
                    image = %image.image_guid,
                    error = %e,
                    "Image file unreadable, exporting chunk without it"
                );
                entry.image = None;
            }
        }
    }

    let book = EpubBook {
        title: ctx.title.clone(),
        identifier: ctx.manuscript_guid.clone(),
        content_xhtml: export::compile_xhtml(ctx, &entries),
        chapters: export::chapters(&entries),
        images,
    };

    tokio::task::spawn_blocking(move || build_epub(&book))
        .await
        .map_err(|e| ApiError::Internal(format!("EPUB task failed: {}", e)))?
        .map_err(|e| ApiError::Conversion(format!("EPUB packaging failed: {}", e)))
}

/// GET /api/manuscripts/:id/download-images?chunk=<n>
///
/// Zip of the latest image of each chunk in `[n, n + images_per_archive)`.
/// When chunks remain, `X-Total-Chunks` and `X-Next-Chunk` point at the
/// next part.
pub async fn download_images(
    State(state): State<AppState>,
    Path(manuscript_guid): Path<String>,
    Query(query): Query<ArchiveQuery>,
) -> ApiResult<impl IntoResponse> {
    let manuscript = get_manuscript(&state.db, &manuscript_guid).await?;
    let total = count_chunks(&state.db, &manuscript_guid).await?;
    let part = ArchivePart::plan(
        total,
        query.chunk.unwrap_or(0),
        state.settings.images_per_archive,
    )?;

    let entries: Vec<ArchiveEntry> = latest_images_in_range(&state.db, &manuscript_guid, part.start, part.end)
        .await?
        .into_iter()
        .map(|image| {
            let source = state.store.image_path(&manuscript_guid, &image.file_name);
            ArchiveEntry::new(image.chunk_order, &image.file_name, source)
        })
        .collect();

    info!(
        manuscript = %manuscript_guid,
        start = part.start,
        end = part.end,
        images = entries.len(),
        "Building image archive"
    );
    let archive = build_archive(entries).await?;

    let file_name = format!(
        "{}-images-{:04}.zip",
        sanitize_file_stem(&manuscript.title),
        part.start
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CONTENT_DISPOSITION, attachment(&file_name)?);
    if let Some(next) = part.next_start() {
        headers.insert(TOTAL_CHUNKS_HEADER, HeaderValue::from(part.total));
        headers.insert(NEXT_CHUNK_HEADER, HeaderValue::from(next));
    }

    Ok((headers, Body::from_stream(temp_file_stream(archive))))
}

fn attachment(file_name: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .map_err(|e| ApiError::Internal(format!("Invalid Content-Disposition: {}", e)))
}
