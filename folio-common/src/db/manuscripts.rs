//! Manuscript database operations
//!
//! Creating a manuscript segments its markdown and stores the resulting
//! chunks in the same transaction.

use crate::db::models::{ImageSettings, Manuscript, ManuscriptSummary};
use crate::db::new_guid;
use crate::segmenter::segment;
use crate::{Error, Result};
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::info;

/// Fields for a new manuscript
#[derive(Debug, Clone)]
pub struct NewManuscript {
    pub title: String,
    pub author_id: String,
    pub markdown: String,
    pub image_settings: ImageSettings,
}

/// Insert a manuscript and its segmented chunks
///
/// Returns the manuscript and the number of chunks created.
pub async fn create_manuscript(pool: &SqlitePool, new: NewManuscript) -> Result<(Manuscript, i64)> {
    if new.title.trim().is_empty() {
        return Err(Error::InvalidInput("Manuscript title must not be empty".to_string()));
    }

    let manuscript = Manuscript {
        guid: new_guid(),
        title: new.title.trim().to_string(),
        author_id: new.author_id,
        original_markdown: new.markdown,
        image_settings: new.image_settings,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO manuscripts (guid, title, author_id, original_markdown, image_settings)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&manuscript.guid)
    .bind(&manuscript.title)
    .bind(&manuscript.author_id)
    .bind(&manuscript.original_markdown)
    .bind(Json(&manuscript.image_settings))
    .execute(&mut *tx)
    .await?;

    let mut chunk_count = 0i64;
    for draft in segment(&manuscript.original_markdown) {
        sqlx::query(
            r#"
            INSERT INTO chunks (guid, manuscript_guid, chunk_order, heading_level1, heading_level2, text)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_guid())
        .bind(&manuscript.guid)
        .bind(draft.order)
        .bind(&draft.heading_level1)
        .bind(&draft.heading_level2)
        .bind(&draft.text)
        .execute(&mut *tx)
        .await?;
        chunk_count += 1;
    }

    tx.commit().await?;

    info!(
        manuscript = %manuscript.guid,
        chunks = chunk_count,
        "Created manuscript '{}'",
        manuscript.title
    );

    Ok((manuscript, chunk_count))
}

/// Get a manuscript by id
pub async fn get_manuscript(pool: &SqlitePool, guid: &str) -> Result<Manuscript> {
    sqlx::query_as::<_, Manuscript>(
        r#"
        SELECT guid, title, author_id, original_markdown, image_settings
        FROM manuscripts
        WHERE guid = ?
        "#,
    )
    .bind(guid)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Manuscript not found: {}", guid)))
}

/// List an author's manuscripts, most recently updated first
pub async fn list_manuscripts_by_author(
    pool: &SqlitePool,
    author_id: &str,
) -> Result<Vec<ManuscriptSummary>> {
    let rows = sqlx::query_as::<_, ManuscriptSummary>(
        r#"
        SELECT m.guid, m.title,
               (SELECT COUNT(*) FROM chunks c WHERE c.manuscript_guid = m.guid) AS chunk_count
        FROM manuscripts m
        WHERE m.author_id = ?
        ORDER BY m.updated_at DESC, m.rowid DESC
        "#,
    )
    .bind(author_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Number of chunks in a manuscript
pub async fn count_chunks(pool: &SqlitePool, manuscript_guid: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE manuscript_guid = ?")
        .bind(manuscript_guid)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Update title and/or image settings; `None` leaves a field unchanged
pub async fn update_manuscript(
    pool: &SqlitePool,
    guid: &str,
    title: Option<String>,
    image_settings: Option<ImageSettings>,
) -> Result<Manuscript> {
    let mut manuscript = get_manuscript(pool, guid).await?;

    if let Some(title) = title {
        if title.trim().is_empty() {
            return Err(Error::InvalidInput("Manuscript title must not be empty".to_string()));
        }
        manuscript.title = title.trim().to_string();
    }
    if let Some(settings) = image_settings {
        manuscript.image_settings = settings;
    }

    sqlx::query(
        r#"
        UPDATE manuscripts
        SET title = ?, image_settings = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&manuscript.title)
    .bind(Json(&manuscript.image_settings))
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(manuscript)
}

/// Delete a manuscript; chunks, images and narrations cascade
pub async fn delete_manuscript(pool: &SqlitePool, guid: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM manuscripts WHERE guid = ?")
        .bind(guid)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Manuscript not found: {}", guid)));
    }

    info!(manuscript = %guid, "Deleted manuscript");
    Ok(())
}
