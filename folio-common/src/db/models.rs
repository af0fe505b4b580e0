//! Database models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Image generation preferences stored per manuscript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Style description prefixed to every image prompt
    #[serde(default)]
    pub style: String,
    /// Image size passed to the generation API (e.g. "1024x1024")
    #[serde(default = "default_image_size")]
    pub size: String,
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            style: String::new(),
            size: default_image_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Manuscript {
    pub guid: String,
    pub title: String,
    pub author_id: String,
    pub original_markdown: String,
    #[sqlx(json)]
    pub image_settings: ImageSettings,
}

/// Manuscript listing entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ManuscriptSummary {
    pub guid: String,
    pub title: String,
    pub chunk_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Chunk {
    pub guid: String,
    pub manuscript_guid: String,
    #[sqlx(rename = "chunk_order")]
    #[serde(rename = "order")]
    pub order: i64,
    pub heading_level1: Option<String>,
    pub heading_level2: Option<String>,
    pub text: String,
}

/// Chunk with the ids of its most recent image and narration
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChunkWithAssets {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub chunk: Chunk,
    pub image_guid: Option<String>,
    pub narration_guid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub guid: String,
    pub chunk_guid: String,
    pub manuscript_guid: String,
    pub file_name: String,
    pub prompt: String,
}

/// Latest image of a chunk, positioned by chunk order
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ChunkImage {
    pub chunk_guid: String,
    pub chunk_order: i64,
    pub image_guid: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Narration {
    pub guid: String,
    pub chunk_guid: String,
    pub manuscript_guid: String,
    pub file_name: String,
    pub voice: String,
}
