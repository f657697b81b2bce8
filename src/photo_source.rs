use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::config::ClientConfig;
use crate::errors::AppResult;
use crate::security::InputValidator;
use crate::uploader::UploadSession;

/// One user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedPhoto {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

/// Supplies raw image bytes, one pick at a time.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn pick(&self) -> AppResult<PickedPhoto>;
}

/// Reads a photo from the local file system.
pub struct FilePhotoSource {
    path: PathBuf,
    valid_extensions: Vec<String>,
    max_size_bytes: u64,
}

impl FilePhotoSource {
    pub fn new(path: impl AsRef<Path>, config: &ClientConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            valid_extensions: config.valid_extensions.clone(),
            max_size_bytes: config.max_file_size_bytes(),
        }
    }
}

#[async_trait]
impl PhotoSource for FilePhotoSource {
    async fn pick(&self) -> AppResult<PickedPhoto> {
        InputValidator::validate_image_path(
            &self.path,
            &self.valid_extensions,
            self.max_size_bytes,
        )?;

        let bytes = tokio::fs::read(&self.path).await?;
        let filename = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());

        log::debug!("Picked {} ({} bytes)", self.path.display(), bytes.len());
        Ok(PickedPhoto { bytes, filename })
    }
}

/// Feed one pick into the session. A source that fails to deliver leaves the
/// session as it was.
pub async fn load_into(session: &UploadSession, source: &dyn PhotoSource) -> bool {
    let photo = match source.pick().await {
        Ok(photo) => photo,
        Err(e) => {
            log::warn!("Photo source did not provide an image: {}", e);
            return false;
        }
    };

    match session.set_image(photo.bytes, photo.filename.as_deref()) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Session rejected the picked image: {}", e);
            false
        }
    }
}
