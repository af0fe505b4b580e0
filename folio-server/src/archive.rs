//! Image archive parts
//!
//! A part covers the chunks with `start <= order < end` and holds the latest
//! image of each. The zip is written to a temporary file on a blocking
//! thread, then streamed. The stream owns the temporary file, so it is
//! deleted when the body finishes or the client goes away.

use axum::body::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tempfile::TempPath;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ApiError, ApiResult};

/// Chunk range of one archive part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePart {
    pub start: i64,
    pub end: i64,
    pub total: i64,
}

impl ArchivePart {
    /// Range starting at `start`, at most `per_part` chunks long
    pub fn plan(total: i64, start: i64, per_part: usize) -> ApiResult<Self> {
        if start < 0 || start > total {
            return Err(ApiError::Validation(format!(
                "Chunk index {} out of range (manuscript has {} chunks)",
                start, total
            )));
        }
        let per_part = (per_part.max(1)) as i64;
        let end = (start + per_part).min(total);
        Ok(Self { start, end, total })
    }

    /// Start of the following part, if chunks remain
    pub fn next_start(&self) -> Option<i64> {
        (self.end < self.total).then_some(self.end)
    }
}

/// File to place in the archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Name inside the zip
    pub name: String,
    pub source: PathBuf,
}

impl ArchiveEntry {
    /// Entry named `{order:04}-{file_name}`
    pub fn new(order: i64, file_name: &str, source: PathBuf) -> Self {
        Self {
            name: format!("{:04}-{}", order, file_name),
            source,
        }
    }
}

/// Write the zip to a new temporary file
///
/// Missing source files are logged and skipped.
pub async fn build_archive(entries: Vec<ArchiveEntry>) -> ApiResult<TempPath> {
    tokio::task::spawn_blocking(move || -> io::Result<TempPath> {
        let mut temp = tempfile::Builder::new()
            .prefix("folio-images-")
            .suffix(".zip")
            .tempfile()?;
        let written = write_zip(&entries, temp.as_file_mut())?;
        debug!(entries = written, path = %temp.path().display(), "Wrote image archive");
        Ok(temp.into_temp_path())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Archive task failed: {}", e)))?
    .map_err(ApiError::from)
}

fn write_zip(entries: &[ArchiveEntry], file: &mut File) -> io::Result<usize> {
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut written = 0;

    for entry in entries {
        let data = match std::fs::read(&entry.source) {
            Ok(data) => data,
            Err(e) => {
                warn!("Skipping image {}: {}", entry.source.display(), e);
                continue;
            }
        };
        zip.start_file(entry.name.as_str(), options)?;
        zip.write_all(&data)?;
        written += 1;
    }

    zip.finish()?;
    Ok(written)
}

/// Stream a temporary file, deleting it once the stream is finished or dropped
pub fn temp_file_stream(path: TempPath) -> impl Stream<Item = io::Result<Bytes>> {
    async_stream::try_stream! {
        let file = tokio::fs::File::open(&path).await?;
        let mut reader = ReaderStream::new(file);
        while let Some(chunk) = reader.next().await {
            yield chunk?;
        }
        drop(reader);
        drop(path);
    }
}
