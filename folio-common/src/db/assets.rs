//! Image and narration rows
//!
//! Asset rows reference a chunk; the owning manuscript is resolved through
//! the chunk so moving chunks never leaves stale manuscript ids behind.

use crate::db::models::{ChunkImage, Image, Narration};
use crate::db::new_guid;
use crate::{Error, Result};
use sqlx::SqlitePool;

/// Record a generated image for a chunk
pub async fn insert_image(
    pool: &SqlitePool,
    chunk_guid: &str,
    file_name: &str,
    prompt: &str,
) -> Result<Image> {
    let guid = new_guid();

    sqlx::query("INSERT INTO images (guid, chunk_guid, file_name, prompt) VALUES (?, ?, ?, ?)")
        .bind(&guid)
        .bind(chunk_guid)
        .bind(file_name)
        .bind(prompt)
        .execute(pool)
        .await?;

    get_image(pool, &guid).await
}

/// Get an image by id
pub async fn get_image(pool: &SqlitePool, guid: &str) -> Result<Image> {
    sqlx::query_as::<_, Image>(
        r#"
        SELECT i.guid, i.chunk_guid, c.manuscript_guid, i.file_name, i.prompt
        FROM images i
        JOIN chunks c ON c.guid = i.chunk_guid
        WHERE i.guid = ?
        "#,
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Image not found: {}", guid)))
}

/// Most recent image of a chunk, if any
pub async fn latest_image_for_chunk(pool: &SqlitePool, chunk_guid: &str) -> Result<Option<Image>> {
    let image = sqlx::query_as::<_, Image>(
        r#"
        SELECT i.guid, i.chunk_guid, c.manuscript_guid, i.file_name, i.prompt
        FROM images i
        JOIN chunks c ON c.guid = i.chunk_guid
        WHERE i.chunk_guid = ?
        ORDER BY i.rowid DESC
        LIMIT 1
        "#,
    )
    .bind(chunk_guid)
    .fetch_optional(pool)
    .await?;

    Ok(image)
}

/// Delete an image row, returning it so the caller can remove the file
pub async fn delete_image(pool: &SqlitePool, guid: &str) -> Result<Image> {
    let image = get_image(pool, guid).await?;

    sqlx::query("DELETE FROM images WHERE guid = ?")
        .bind(guid)
        .execute(pool)
        .await?;

    Ok(image)
}

/// Latest image of every chunk with `start <= order < end`, in order
///
/// Chunks without an image are omitted.
pub async fn latest_images_in_range(
    pool: &SqlitePool,
    manuscript_guid: &str,
    start: i64,
    end: i64,
) -> Result<Vec<ChunkImage>> {
    let rows = sqlx::query_as::<_, ChunkImage>(
        r#"
        SELECT c.guid AS chunk_guid, c.chunk_order, i.guid AS image_guid, i.file_name
        FROM chunks c
        JOIN images i ON i.rowid = (
            SELECT MAX(rowid) FROM images WHERE chunk_guid = c.guid
        )
        WHERE c.manuscript_guid = ? AND c.chunk_order >= ? AND c.chunk_order < ?
        ORDER BY c.chunk_order ASC
        "#,
    )
    .bind(manuscript_guid)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Record synthesized narration for a chunk
pub async fn insert_narration(
    pool: &SqlitePool,
    chunk_guid: &str,
    file_name: &str,
    voice: &str,
) -> Result<Narration> {
    let guid = new_guid();

    sqlx::query("INSERT INTO narrations (guid, chunk_guid, file_name, voice) VALUES (?, ?, ?, ?)")
        .bind(&guid)
        .bind(chunk_guid)
        .bind(file_name)
        .bind(voice)
        .execute(pool)
        .await?;

    get_narration(pool, &guid).await
}

/// Get a narration by id
pub async fn get_narration(pool: &SqlitePool, guid: &str) -> Result<Narration> {
    sqlx::query_as::<_, Narration>(
        r#"
        SELECT n.guid, n.chunk_guid, c.manuscript_guid, n.file_name, n.voice
        FROM narrations n
        JOIN chunks c ON c.guid = n.chunk_guid
        WHERE n.guid = ?
        "#,
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Narration not found: {}", guid)))
}

/// Most recent narration of a chunk, if any
pub async fn latest_narration_for_chunk(
    pool: &SqlitePool,
    chunk_guid: &str,
) -> Result<Option<Narration>> {
    let narration = sqlx::query_as::<_, Narration>(
        r#"
        SELECT n.guid, n.chunk_guid, c.manuscript_guid, n.file_name, n.voice
        FROM narrations n
        JOIN chunks c ON c.guid = n.chunk_guid
        WHERE n.chunk_guid = ?
        ORDER BY n.rowid DESC
        LIMIT 1
        "#,
    )
    .bind(chunk_guid)
    .fetch_optional(pool)
    .await?;

    Ok(narration)
}
