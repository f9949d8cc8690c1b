//! Remote art store seam
//!
//! The television's wire protocol lives outside this crate. Anything that
//! can list, thumbnail, upload, delete and select content implements
//! [`ArtStore`]. [`FolderArtStore`] keeps content in a local directory and
//! is what dry runs and tests use.

use async_trait::async_trait;
use image::imageops::FilterType;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DeviceError {
    /// Connection dropped or reset; the call may succeed if repeated
    #[error("Transient transport error: {0}")]
    Transient(String),

    #[error("Device rejected the request: {0}")]
    Rejected(String),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DeviceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Transient(_))
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted => DeviceError::Transient(e.to_string()),
            ErrorKind::NotFound => DeviceError::NotFound(e.to_string()),
            _ => DeviceError::Protocol(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    pub fn from_path(path: &Path) -> MediaType {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => MediaType::Png,
            _ => MediaType::Jpeg,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "JPEG",
            MediaType::Png => "PNG",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
        }
    }
}

/// One item in the device's content listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub content_id: String,
    pub category: String,
}

/// Remote content store
#[async_trait]
pub trait ArtStore: Send + Sync {
    async fn list(&self, category: &str) -> Result<Vec<RemoteItem>, DeviceError>;

    /// Thumbnails keyed by the name the device returns, which may carry a
    /// file extension after the content id
    async fn thumbnails(
        &self,
        content_ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, DeviceError>;

    /// Store an image, returning its new content id.
    ///
    /// `matte` names the device's own matte style; `None` turns it off.
    async fn upload(
        &self,
        data: Vec<u8>,
        media_type: MediaType,
        matte: Option<&str>,
    ) -> Result<String, DeviceError>;

    async fn delete(&self, content_ids: &[String]) -> Result<(), DeviceError>;

    /// Show an item on screen
    async fn select(&self, content_id: &str) -> Result<(), DeviceError>;
}

/// Content id from a thumbnail key (`MY_F0001.jpg` -> `MY_F0001`)
pub fn strip_extension(key: &str) -> &str {
    match key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            stem
        }
        _ => key,
    }
}

const THUMBNAIL_WIDTH: u32 = 384;
const THUMBNAIL_HEIGHT: u32 = 216;
const SELECTED_FILE: &str = "selected";
const ID_PREFIX: &str = "MY_F";

/// Directory-backed [`ArtStore`]
///
/// Content lives at `<dir>/<id>.<ext>`; ids are `MY_F<n>` in upload order.
/// Thumbnails are downscaled JPEGs generated on request.
pub struct FolderArtStore {
    dir: PathBuf,
    category: String,
}

impl FolderArtStore {
    pub fn new(dir: impl Into<PathBuf>, category: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            category: category.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Currently selected content id
    pub async fn selected(&self) -> Option<String> {
        fs::read_to_string(self.dir.join(SELECTED_FILE))
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    async fn entries(&self) -> Result<Vec<(String, PathBuf)>, DeviceError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(ID_PREFIX) {
                continue;
            }
            entries.push((strip_extension(name).to_string(), path));
        }
        entries.sort();
        Ok(entries)
    }

    async fn path_of(&self, content_id: &str) -> Result<Option<PathBuf>, DeviceError> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|(id, _)| id == content_id)
            .map(|(_, p)| p))
    }

    async fn next_id(&self) -> Result<String, DeviceError> {
        let highest = self
            .entries()
            .await?
            .iter()
            .filter_map(|(id, _)| id.strip_prefix(ID_PREFIX)?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{}{:04}", ID_PREFIX, highest + 1))
    }
}

fn thumbnail_jpeg(data: &[u8]) -> Result<Vec<u8>, DeviceError> {
    let image =
        image::load_from_memory(data).map_err(|e| DeviceError::Protocol(e.to_string()))?;
    let thumb = image.resize_exact(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Triangle);
    let mut buf = Vec::new();
    thumb
        .to_rgb8()
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|e| DeviceError::Protocol(e.to_string()))?;
    Ok(buf)
}

#[async_trait]
impl ArtStore for FolderArtStore {
    async fn list(&self, category: &str) -> Result<Vec<RemoteItem>, DeviceError> {
        if category != self.category {
            return Ok(Vec::new());
        }
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(content_id, _)| RemoteItem {
                content_id,
                category: self.category.clone(),
            })
            .collect())
    }

    async fn thumbnails(
        &self,
        content_ids: &[String],
    ) -> Result<HashMap<String, Vec<u8>>, DeviceError> {
        let mut thumbnails = HashMap::new();
        for id in content_ids {
            let path = self
                .path_of(id)
                .await?
                .ok_or_else(|| DeviceError::NotFound(id.clone()))?;
            let data = fs::read(&path).await?;
            thumbnails.insert(format!("{}.jpg", id), thumbnail_jpeg(&data)?);
        }
        Ok(thumbnails)
    }

    async fn upload(
        &self,
        data: Vec<u8>,
        media_type: MediaType,
        matte: Option<&str>,
    ) -> Result<String, DeviceError> {
        if data.is_empty() {
            return Err(DeviceError::Rejected("empty upload".to_string()));
        }
        fs::create_dir_all(&self.dir).await?;

        let id = self.next_id().await?;
        let path = self.dir.join(format!("{}.{}", id, media_type.extension()));
        fs::write(&path, &data).await?;
        info!(
            content_id = %id,
            media_type = media_type.as_str(),
            matte = matte.unwrap_or("none"),
            "Stored content"
        );
        Ok(id)
    }

    async fn delete(&self, content_ids: &[String]) -> Result<(), DeviceError> {
        for id in content_ids {
            if let Some(path) = self.path_of(id).await? {
                fs::remove_file(&path).await?;
                debug!(content_id = %id, "Deleted content");
            }
        }
        Ok(())
    }

    async fn select(&self, content_id: &str) -> Result<(), DeviceError> {
        if self.path_of(content_id).await?.is_none() {
            return Err(DeviceError::NotFound(content_id.to_string()));
        }
        fs::write(self.dir.join(SELECTED_FILE), content_id).await?;
        Ok(())
    }
}
