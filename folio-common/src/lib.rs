//! # Folio Common Library
//!
//! Domain code shared by the Folio service:
//! - Database models, schema initialization and queries
//! - Markdown segmentation into chunks
//! - Chunk ordering (reorder, merge, split) with contiguous order values
//! - Export compilation (Markdown, DOCX source, EPUB body)
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ordering;
pub mod segmenter;

pub use error::{Error, Result};
pub use export::ExportFormat;
pub use ordering::Direction;
pub use segmenter::{segment, validate_markdown, ChunkDraft};
