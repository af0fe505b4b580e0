//! Chunk database operations
//!
//! Every operation that changes `chunk_order` runs in a single transaction
//! whose first statement touches the owning manuscript row. That takes the
//! SQLite write lock before any chunk is read, so concurrent reorders,
//! merges and splits on one manuscript are serialized and none of them can
//! observe a duplicated or missing order value.

use crate::db::models::{Chunk, ChunkWithAssets};
use crate::db::new_guid;
use crate::ordering::{self, Direction};
use crate::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info};

/// Fields for a chunk inserted by hand
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Position of the new chunk; `0..=chunk count`
    pub position: i64,
    pub text: String,
    pub heading_level1: Option<String>,
    pub heading_level2: Option<String>,
}

/// Field edits; `None` keeps the current value, an empty heading clears it
#[derive(Debug, Clone, Default)]
pub struct ChunkEdit {
    pub text: Option<String>,
    pub heading_level1: Option<String>,
    pub heading_level2: Option<String>,
}

// ========================================
// Queries
// ========================================

/// Get a chunk by id
pub async fn get_chunk(pool: &SqlitePool, guid: &str) -> Result<Chunk> {
    let mut conn = pool.acquire().await?;
    fetch_chunk(&mut conn, guid).await
}

/// All chunks of a manuscript in reading order
pub async fn list_chunks(pool: &SqlitePool, manuscript_guid: &str) -> Result<Vec<Chunk>> {
    let rows = sqlx::query_as::<_, Chunk>(
        r#"
        SELECT guid, manuscript_guid, chunk_order, heading_level1, heading_level2, text
        FROM chunks
        WHERE manuscript_guid = ?
        ORDER BY chunk_order ASC
        "#,
    )
    .bind(manuscript_guid)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// One page of chunks with their latest image and narration ids
pub async fn list_chunk_page(
    pool: &SqlitePool,
    manuscript_guid: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<ChunkWithAssets>> {
    let rows = sqlx::query_as::<_, ChunkWithAssets>(
        r#"
        SELECT c.guid, c.manuscript_guid, c.chunk_order, c.heading_level1, c.heading_level2, c.text,
               (SELECT i.guid FROM images i
                WHERE i.chunk_guid = c.guid
                ORDER BY i.rowid DESC LIMIT 1) AS image_guid,
               (SELECT n.guid FROM narrations n
                WHERE n.chunk_guid = c.guid
                ORDER BY n.rowid DESC LIMIT 1) AS narration_guid
        FROM chunks c
        WHERE c.manuscript_guid = ?
        ORDER BY c.chunk_order ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(manuscript_guid)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Order values of a manuscript's chunks, ascending
pub async fn chunk_orders(pool: &SqlitePool, manuscript_guid: &str) -> Result<Vec<i64>> {
    let mut conn = pool.acquire().await?;
    fetch_orders(&mut conn, manuscript_guid).await
}

// ========================================
// Edits without reordering
// ========================================

/// Update text and/or headings of a chunk
pub async fn update_chunk(pool: &SqlitePool, guid: &str, edit: ChunkEdit) -> Result<Chunk> {
    let mut chunk = get_chunk(pool, guid).await?;

    if let Some(text) = edit.text {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("Chunk text must not be empty".to_string()));
        }
        chunk.text = text;
    }
    if let Some(heading) = edit.heading_level1 {
        chunk.heading_level1 = non_empty(heading);
    }
    if let Some(heading) = edit.heading_level2 {
        chunk.heading_level2 = non_empty(heading);
    }

    sqlx::query(
        r#"
        UPDATE chunks
        SET text = ?, heading_level1 = ?, heading_level2 = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&chunk.text)
    .bind(&chunk.heading_level1)
    .bind(&chunk.heading_level2)
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(chunk)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ========================================
// Order-changing operations
// ========================================

/// Swap a chunk with its neighbor in the given direction
///
/// At either end of the sequence this is a no-op and returns the chunk
/// unchanged.
pub async fn reorder_chunk(pool: &SqlitePool, guid: &str, direction: Direction) -> Result<Chunk> {
    let manuscript_guid = manuscript_of(pool, guid).await?;

    let mut tx = begin_manuscript_write(pool, &manuscript_guid).await?;
    let chunk = fetch_chunk(&mut tx, guid).await?;
    let count = count_in(&mut tx, &manuscript_guid).await?;

    let Some(target) = direction.neighbor_order(chunk.order, count) else {
        tx.rollback().await?;
        debug!(chunk = %guid, ?direction, "Reorder at sequence boundary, nothing to do");
        return Ok(chunk);
    };

    let neighbor = fetch_chunk_at(&mut tx, &manuscript_guid, target).await?;
    set_order(&mut tx, &neighbor.guid, chunk.order).await?;
    set_order(&mut tx, &chunk.guid, target).await?;

    commit_checked(tx, &manuscript_guid).await?;

    info!(chunk = %guid, from = chunk.order, to = target, "Reordered chunk");
    Ok(Chunk {
        order: target,
        ..chunk
    })
}

/// Merge `second` into `first`
///
/// `second` must immediately follow `first` in the same manuscript. The
/// merged chunk keeps `first`'s id, order and headings; `second` is deleted
/// and every later chunk moves up by one.
pub async fn merge_chunks(pool: &SqlitePool, first_guid: &str, second_guid: &str) -> Result<Chunk> {
    if first_guid == second_guid {
        return Err(Error::InvalidInput("Cannot merge a chunk with itself".to_string()));
    }

    let manuscript_guid = manuscript_of(pool, first_guid).await?;
    if manuscript_of(pool, second_guid).await? != manuscript_guid {
        return Err(Error::InvalidInput(
            "Chunks belong to different manuscripts".to_string(),
        ));
    }

    let mut tx = begin_manuscript_write(pool, &manuscript_guid).await?;
    let first = fetch_chunk(&mut tx, first_guid).await?;
    let second = fetch_chunk(&mut tx, second_guid).await?;

    if second.order != first.order + 1 {
        return Err(Error::InvalidInput(format!(
            "Chunk at order {} does not immediately follow chunk at order {}",
            second.order, first.order
        )));
    }

    let merged_text = ordering::merge_text(&first.text, &second.text);

    sqlx::query("UPDATE chunks SET text = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(&merged_text)
        .bind(&first.guid)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM chunks WHERE guid = ?")
        .bind(&second.guid)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE chunks SET chunk_order = chunk_order - 1 WHERE manuscript_guid = ? AND chunk_order > ?",
    )
    .bind(&manuscript_guid)
    .bind(second.order)
    .execute(&mut *tx)
    .await?;

    commit_checked(tx, &manuscript_guid).await?;

    info!(chunk = %first.guid, removed = %second.guid, "Merged chunks");
    Ok(Chunk {
        text: merged_text,
        ..first
    })
}

/// Split a chunk at a character offset
///
/// The original chunk keeps the head; a new chunk holding the tail is
/// inserted right after it and inherits the chapter heading. Returns
/// `(head, tail)`.
pub async fn split_chunk(pool: &SqlitePool, guid: &str, split_point: usize) -> Result<(Chunk, Chunk)> {
    let manuscript_guid = manuscript_of(pool, guid).await?;

    let mut tx = begin_manuscript_write(pool, &manuscript_guid).await?;
    let chunk = fetch_chunk(&mut tx, guid).await?;
    let (head_text, tail_text) = ordering::split_text(&chunk.text, split_point)?;

    sqlx::query(
        "UPDATE chunks SET chunk_order = chunk_order + 1 WHERE manuscript_guid = ? AND chunk_order > ?",
    )
    .bind(&manuscript_guid)
    .bind(chunk.order)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE chunks SET text = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(&head_text)
        .bind(&chunk.guid)
        .execute(&mut *tx)
        .await?;

    let tail = Chunk {
        guid: new_guid(),
        manuscript_guid: manuscript_guid.clone(),
        order: chunk.order + 1,
        heading_level1: chunk.heading_level1.clone(),
        heading_level2: None,
        text: tail_text,
    };
    insert_row(&mut tx, &tail).await?;

    commit_checked(tx, &manuscript_guid).await?;

    info!(chunk = %guid, new_chunk = %tail.guid, split_point, "Split chunk");
    let head = Chunk {
        text: head_text,
        ..chunk
    };
    Ok((head, tail))
}

/// Insert a chunk at a position, shifting later chunks down
pub async fn insert_chunk(pool: &SqlitePool, manuscript_guid: &str, new: NewChunk) -> Result<Chunk> {
    if new.text.trim().is_empty() {
        return Err(Error::InvalidInput("Chunk text must not be empty".to_string()));
    }

    let mut tx = begin_manuscript_write(pool, manuscript_guid).await?;
    let count = count_in(&mut tx, manuscript_guid).await?;

    if new.position < 0 || new.position > count {
        return Err(Error::InvalidInput(format!(
            "Position {} out of range (manuscript has {} chunks)",
            new.position, count
        )));
    }

    sqlx::query(
        "UPDATE chunks SET chunk_order = chunk_order + 1 WHERE manuscript_guid = ? AND chunk_order >= ?",
    )
    .bind(manuscript_guid)
    .bind(new.position)
    .execute(&mut *tx)
    .await?;

    let chunk = Chunk {
        guid: new_guid(),
        manuscript_guid: manuscript_guid.to_string(),
        order: new.position,
        heading_level1: new.heading_level1.and_then(non_empty),
        heading_level2: new.heading_level2.and_then(non_empty),
        text: new.text,
    };
    insert_row(&mut tx, &chunk).await?;

    commit_checked(tx, manuscript_guid).await?;

    info!(chunk = %chunk.guid, order = chunk.order, "Inserted chunk");
    Ok(chunk)
}

/// Delete a chunk, moving every later chunk up by one
pub async fn delete_chunk(pool: &SqlitePool, guid: &str) -> Result<Chunk> {
    let manuscript_guid = manuscript_of(pool, guid).await?;

    let mut tx = begin_manuscript_write(pool, &manuscript_guid).await?;
    let chunk = fetch_chunk(&mut tx, guid).await?;

    sqlx::query("DELETE FROM chunks WHERE guid = ?")
        .bind(guid)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE chunks SET chunk_order = chunk_order - 1 WHERE manuscript_guid = ? AND chunk_order > ?",
    )
    .bind(&manuscript_guid)
    .bind(chunk.order)
    .execute(&mut *tx)
    .await?;

    commit_checked(tx, &manuscript_guid).await?;

    info!(chunk = %guid, order = chunk.order, "Deleted chunk");
    Ok(chunk)
}

// ========================================
// Transaction helpers
// ========================================

/// Begin a transaction holding the write lock for one manuscript
async fn begin_manuscript_write<'a>(
    pool: &'a SqlitePool,
    manuscript_guid: &str,
) -> Result<Transaction<'a, Sqlite>> {
    let mut tx = pool.begin().await?;

    let touched = sqlx::query("UPDATE manuscripts SET updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(manuscript_guid)
        .execute(&mut *tx)
        .await?;

    if touched.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Manuscript not found: {}", manuscript_guid)));
    }

    Ok(tx)
}

/// Commit after confirming the orders are still contiguous (debug builds)
async fn commit_checked(mut tx: Transaction<'_, Sqlite>, manuscript_guid: &str) -> Result<()> {
    #[cfg(debug_assertions)]
    {
        let orders = fetch_orders(&mut tx, manuscript_guid).await?;
        if !ordering::is_contiguous(&orders) {
            return Err(Error::Internal(format!(
                "Chunk orders of manuscript {} not contiguous: {:?}",
                manuscript_guid, orders
            )));
        }
    }
    #[cfg(not(debug_assertions))]
    let _ = manuscript_guid;

    tx.commit().await?;
    Ok(())
}

async fn manuscript_of(pool: &SqlitePool, chunk_guid: &str) -> Result<String> {
    sqlx::query_scalar::<_, String>("SELECT manuscript_guid FROM chunks WHERE guid = ?")
        .bind(chunk_guid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Chunk not found: {}", chunk_guid)))
}

async fn fetch_chunk(conn: &mut SqliteConnection, guid: &str) -> Result<Chunk> {
    sqlx::query_as::<_, Chunk>(
        r#"
        SELECT guid, manuscript_guid, chunk_order, heading_level1, heading_level2, text
        FROM chunks
        WHERE guid = ?
        "#,
    )
    .bind(guid)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Chunk not found: {}", guid)))
}

async fn fetch_chunk_at(conn: &mut SqliteConnection, manuscript_guid: &str, order: i64) -> Result<Chunk> {
    sqlx::query_as::<_, Chunk>(
        r#"
        SELECT guid, manuscript_guid, chunk_order, heading_level1, heading_level2, text
        FROM chunks
        WHERE manuscript_guid = ? AND chunk_order = ?
        "#,
    )
    .bind(manuscript_guid)
    .bind(order)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| {
        Error::Internal(format!(
            "No chunk at order {} in manuscript {}",
            order, manuscript_guid
        ))
    })
}

async fn fetch_orders(conn: &mut SqliteConnection, manuscript_guid: &str) -> Result<Vec<i64>> {
    let orders = sqlx::query_scalar::<_, i64>(
        "SELECT chunk_order FROM chunks WHERE manuscript_guid = ? ORDER BY chunk_order ASC",
    )
    .bind(manuscript_guid)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

async fn count_in(conn: &mut SqliteConnection, manuscript_guid: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE manuscript_guid = ?")
        .bind(manuscript_guid)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

async fn set_order(conn: &mut SqliteConnection, guid: &str, order: i64) -> Result<()> {
    sqlx::query("UPDATE chunks SET chunk_order = ?, updated_at = CURRENT_TIMESTAMP WHERE guid = ?")
        .bind(order)
        .bind(guid)
        .execute(conn)
        .await?;
    Ok(())
}

async fn insert_row(conn: &mut SqliteConnection, chunk: &Chunk) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunks (guid, manuscript_guid, chunk_order, heading_level1, heading_level2, text)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.guid)
    .bind(&chunk.manuscript_guid)
    .bind(chunk.order)
    .bind(&chunk.heading_level1)
    .bind(&chunk.heading_level2)
    .bind(&chunk.text)
    .execute(conn)
    .await?;
    Ok(())
}
