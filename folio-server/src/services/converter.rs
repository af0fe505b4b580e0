//! DOCX conversion through pandoc

use axum::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Document conversion errors
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to start converter {0}: {1}")]
    Spawn(String, String),

    #[error("Converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Converter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts compiled Markdown into a DOCX document
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// `working_dir` is where relative image paths in `markdown` resolve
    async fn markdown_to_docx(&self, markdown: &str, working_dir: &Path) -> Result<Vec<u8>, ConversionError>;
}

/// Runs `pandoc -f markdown -t docx` with the Markdown on stdin
pub struct PandocConverter {
    pandoc_path: PathBuf,
}

impl PandocConverter {
    pub fn new(pandoc_path: PathBuf) -> Self {
        Self { pandoc_path }
    }
}

#[async_trait]
impl DocumentConverter for PandocConverter {
    async fn markdown_to_docx(&self, markdown: &str, working_dir: &Path) -> Result<Vec<u8>, ConversionError> {
        // Removed when dropped, on success and on every error path
        let output = tempfile::Builder::new()
            .prefix("folio-export-")
            .suffix(".docx")
            .tempfile()?;

        debug!(
            output = %output.path().display(),
            cwd = %working_dir.display(),
            "Running pandoc"
        );

        let mut child = Command::new(&self.pandoc_path)
            .args(["-f", "markdown", "-t", "docx", "-o"])
            .arg(output.path())
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::Spawn(self.pandoc_path.display().to_string(), e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(markdown.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            return Err(ConversionError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let bytes = tokio::fs::read(output.path()).await?;
        Ok(bytes)
    }
}
