//! Database initialization
//!
//! Opens (or creates) the SQLite database and creates the schema. Table
//! creation is idempotent, so this runs on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // foreign_keys and busy_timeout are per-connection settings, so they go
    // on the connect options rather than a one-off PRAGMA
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to one connection that is never recycled: every pooled
/// connection to `sqlite::memory:` would otherwise see its own empty database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_manuscripts_table(pool).await?;
    create_chunks_table(pool).await?;
    create_images_table(pool).await?;
    create_narrations_table(pool).await?;
    Ok(())
}

async fn create_manuscripts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manuscripts (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author_id TEXT NOT NULL,
            original_markdown TEXT NOT NULL,
            image_settings TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_manuscripts_author ON manuscripts(author_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_chunks_table(pool: &SqlitePool) -> Result<()> {
    // No UNIQUE constraint on (manuscript_guid, chunk_order): order shifts
    // update rows one at a time and would collide mid-statement. Contiguity
    // is maintained by the transactional operations in db::chunks.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            guid TEXT PRIMARY KEY,
            manuscript_guid TEXT NOT NULL REFERENCES manuscripts(guid) ON DELETE CASCADE,
            chunk_order INTEGER NOT NULL,
            heading_level1 TEXT,
            heading_level2 TEXT,
            text TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_manuscript_order ON chunks(manuscript_guid, chunk_order)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            guid TEXT PRIMARY KEY,
            chunk_guid TEXT NOT NULL REFERENCES chunks(guid) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            prompt TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_chunk ON images(chunk_guid)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_narrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS narrations (
            guid TEXT PRIMARY KEY,
            chunk_guid TEXT NOT NULL REFERENCES chunks(guid) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            voice TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_narrations_chunk ON narrations(chunk_guid)")
        .execute(pool)
        .await?;

    Ok(())
}
