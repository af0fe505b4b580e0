//! Filesystem asset store
//!
//! Layout below the asset root:
//! - `images/<manuscript>/<uuid>.png`
//! - `audio/<manuscript>/<uuid>.mp3`

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const IMAGES_DIR: &str = "images";
const AUDIO_DIR: &str = "audio";

#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Asset root; DOCX conversion runs here so `images/...` paths resolve
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_dir(&self, manuscript_guid: &str) -> PathBuf {
        self.root.join(IMAGES_DIR).join(manuscript_guid)
    }

    pub fn audio_dir(&self, manuscript_guid: &str) -> PathBuf {
        self.root.join(AUDIO_DIR).join(manuscript_guid)
    }

    pub fn image_path(&self, manuscript_guid: &str, file_name: &str) -> PathBuf {
        self.image_dir(manuscript_guid).join(file_name)
    }

    pub fn audio_path(&self, manuscript_guid: &str, file_name: &str) -> PathBuf {
        self.audio_dir(manuscript_guid).join(file_name)
    }

    /// Store PNG bytes, returning the generated file name
    pub async fn save_image(&self, manuscript_guid: &str, bytes: &[u8]) -> io::Result<String> {
        save(&self.image_dir(manuscript_guid), "png", bytes).await
    }

    /// Store MP3 bytes, returning the generated file name
    pub async fn save_audio(&self, manuscript_guid: &str, bytes: &[u8]) -> io::Result<String> {
        save(&self.audio_dir(manuscript_guid), "mp3", bytes).await
    }

    pub async fn read_image(&self, manuscript_guid: &str, file_name: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.image_path(manuscript_guid, file_name)).await
    }

    pub async fn read_audio(&self, manuscript_guid: &str, file_name: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.audio_path(manuscript_guid, file_name)).await
    }

    pub async fn image_exists(&self, manuscript_guid: &str, file_name: &str) -> bool {
        tokio::fs::try_exists(self.image_path(manuscript_guid, file_name))
            .await
            .unwrap_or(false)
    }

    /// Remove one image file; failures are logged, not returned
    pub async fn remove_image(&self, manuscript_guid: &str, file_name: &str) {
        let path = self.image_path(manuscript_guid, file_name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove image file {}: {}", path.display(), e);
        }
    }

    /// Remove all images and audio of a manuscript; failures are logged
    pub async fn remove_manuscript(&self, manuscript_guid: &str) {
        for dir in [self.image_dir(manuscript_guid), self.audio_dir(manuscript_guid)] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => debug!("Removed asset directory {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove asset directory {}: {}", dir.display(), e),
            }
        }
    }
}

async fn save(dir: &Path, extension: &str, bytes: &[u8]) -> io::Result<String> {
    tokio::fs::create_dir_all(dir).await?;
    let file_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
    tokio::fs::write(dir.join(&file_name), bytes).await?;
    debug!(bytes = bytes.len(), "Stored asset {}", file_name);
    Ok(file_name)
}
