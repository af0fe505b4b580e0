//! Chunk illustration: prompt building, generation and storage
//!
//! Batch generation walks chunks one at a time. A failed chunk is logged and
//! reported; the batch moves on to the next chunk.

use folio_common::db::assets::{insert_image, latest_image_for_chunk};
use folio_common::db::chunks::list_chunks;
use folio_common::db::{Chunk, Image, ImageSettings, Manuscript};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::services::image_generator::ImageGenerator;
use crate::storage::AssetStore;

/// Prompts longer than this are truncated
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Image prompt for a chunk: `"{style}. {heading}: {text}"`, truncated
pub fn build_prompt(settings: &ImageSettings, chunk: &Chunk) -> String {
    let mut prompt = String::new();

    let style = settings.style.trim();
    if !style.is_empty() {
        prompt.push_str(style);
        prompt.push_str(". ");
    }
    if let Some(heading) = chunk.heading_level1.as_deref() {
        prompt.push_str(heading);
        prompt.push_str(": ");
    }
    prompt.push_str(&chunk.text);

    prompt.chars().take(MAX_PROMPT_CHARS).collect()
}

/// One chunk the batch could not illustrate
#[derive(Debug, Clone, Serialize)]
pub struct FailedChunk {
    pub chunk_id: String,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub generated: usize,
    pub skipped: usize,
    pub failed: Vec<FailedChunk>,
}

pub struct Illustrator<'a> {
    pub db: &'a SqlitePool,
    pub generator: &'a dyn ImageGenerator,
    pub store: &'a AssetStore,
}

impl Illustrator<'_> {
    /// Generate, store and record a new image for one chunk
    pub async fn illustrate(&self, manuscript: &Manuscript, chunk: &Chunk) -> ApiResult<Image> {
        let prompt = build_prompt(&manuscript.image_settings, chunk);
        let bytes = self
            .generator
            .generate(&prompt, &manuscript.image_settings.size)
            .await?;

        let file_name = self.store.save_image(&manuscript.guid, &bytes).await?;

        match insert_image(self.db, &chunk.guid, &file_name, &prompt).await {
            Ok(image) => {
                info!(chunk = %chunk.guid, image = %image.guid, "Generated image");
                Ok(image)
            }
            Err(e) => {
                // Chunk may have been merged away while the image was generated
                self.store.remove_image(&manuscript.guid, &file_name).await;
                Err(ApiError::from(e))
            }
        }
    }

    /// Illustrate every chunk of a manuscript in order
    pub async fn illustrate_all(&self, manuscript: &Manuscript, skip_existing: bool) -> ApiResult<BatchReport> {
        let chunks = list_chunks(self.db, &manuscript.guid).await?;
        let mut report = BatchReport::default();

        for chunk in &chunks {
            if skip_existing && latest_image_for_chunk(self.db, &chunk.guid).await?.is_some() {
                report.skipped += 1;
                continue;
            }

            match self.illustrate(manuscript, chunk).await {
                Ok(_) => report.generated += 1,
                Err(e) => {
                    warn!(chunk = %chunk.guid, "Image generation failed: {}", e);
                    report.failed.push(FailedChunk {
                        chunk_id: chunk.guid.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            manuscript = %manuscript.guid,
            generated = report.generated,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Batch image generation finished"
        );
        Ok(report)
    }
}
