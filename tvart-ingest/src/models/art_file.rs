//! One artwork's processing record

use crate::models::{MatColor, Metadata, ResizePolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tvart_common::FolderLayout;

/// Extensions written back out losslessly as PNG
const LOSSLESS_EXTENSIONS: &[&str] = &["png", "bmp", "tif", "tiff", "gif"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtFile {
    /// Source URL, the identity of this item within its set
    #[serde(alias = "source_url")]
    pub url: String,

    /// File name under the raw folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_height: Option<u32>,

    /// Overrides the set default when present
    #[serde(
        default,
        alias = "resize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub resize_policy: Option<ResizePolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mat_color: Option<MatColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mat_reason: Option<String>,

    /// File name under the ready folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_file: Option<String>,
    /// File name under the label folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_file: Option<String>,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Device-assigned id; a cache only, re-derived on every sync
    #[serde(
        default,
        alias = "tv_content_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_content_id: Option<String>,
    /// SHA-256 of the last confirmed device thumbnail
    #[serde(
        default,
        alias = "tv_content_thumb_md5",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_thumbnail_hash: Option<String>,
    /// Ready file the cached digest was confirmed against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ready_file: Option<String>,
}

impl ArtFile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn effective_policy(&self, default: ResizePolicy) -> ResizePolicy {
        self.resize_policy.unwrap_or(default)
    }

    pub fn raw_path(&self, layout: &FolderLayout) -> Option<PathBuf> {
        self.raw_file.as_ref().map(|f| layout.raw.join(f))
    }

    pub fn ready_path(&self, layout: &FolderLayout) -> Option<PathBuf> {
        self.ready_file.as_ref().map(|f| layout.ready.join(f))
    }

    pub fn label_path(&self, layout: &FolderLayout) -> Option<PathBuf> {
        self.label_file.as_ref().map(|f| layout.label.join(f))
    }

    /// Record a newly acquired raw file.
    ///
    /// A different file invalidates everything derived from the old one.
    pub fn set_raw_file(&mut self, name: String) {
        if self.raw_file.as_deref() != Some(name.as_str()) {
            self.raw_width = None;
            self.raw_height = None;
            self.mat_color = None;
            self.mat_reason = None;
            self.ready_file = None;
            self.label_file = None;
            self.forget_remote();
        }
        self.raw_file = Some(name);
    }

    /// Record a freshly written ready file.
    ///
    /// Whatever the device showed before is no longer this item's content.
    pub fn set_ready_file(&mut self, name: String) {
        self.ready_file = Some(name);
        self.forget_remote();
    }

    /// Forget the raw file (purged or unusable)
    pub fn clear_raw(&mut self) {
        self.raw_file = None;
        self.raw_width = None;
        self.raw_height = None;
    }

    pub fn raw_dimensions(&self) -> Option<(u32, u32)> {
        match (self.raw_width, self.raw_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    pub fn clear_remote(&mut self) {
        self.remote_content_id = None;
    }

    /// Drop the content id and the cached digest
    pub fn forget_remote(&mut self) {
        self.remote_content_id = None;
        self.remote_thumbnail_hash = None;
        self.remote_ready_file = None;
    }

    /// Remember which device item shows the current ready file
    pub fn record_remote(&mut self, content_id: String, thumbnail_hash: Option<String>) {
        self.remote_content_id = Some(content_id);
        self.remote_ready_file = thumbnail_hash.as_ref().and(self.ready_file.clone());
        self.remote_thumbnail_hash = thumbnail_hash;
    }

    /// Cached device digest, only while it still belongs to the ready file
    pub fn cached_thumbnail_hash(&self) -> Option<&str> {
        match (&self.ready_file, &self.remote_ready_file) {
            (Some(ready), Some(confirmed)) if ready == confirmed => {
                self.remote_thumbnail_hash.as_deref()
            }
            _ => None,
        }
    }

    /// The ready file for the current raw file, policy and mat color exists
    /// and is at least as new as the raw file.
    pub fn is_ready_current(&self, layout: &FolderLayout, policy: ResizePolicy) -> bool {
        let (Some(raw), Some(ready)) = (&self.raw_file, &self.ready_file) else {
            return false;
        };
        let mat = if policy.needs_mat() { self.mat_color } else { None };
        if *ready != ready_file_name(raw, policy, mat) {
            return false;
        }

        match (
            modified(&layout.raw.join(raw)),
            modified(&layout.ready.join(ready)),
        ) {
            (Some(raw_time), Some(ready_time)) => ready_time >= raw_time,
            _ => false,
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub fn is_lossless(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| LOSSLESS_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `<raw stem>_<policy>[_<rrggbb>].<png|jpg>`
pub fn ready_file_name(raw_file: &str, policy: ResizePolicy, mat: Option<MatColor>) -> String {
    let stem = Path::new(raw_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(raw_file);
    let ext = if is_lossless(raw_file) { "png" } else { "jpg" };

    match mat {
        Some(color) => format!("{}_{}_{}.{}", stem, policy, color.hex_digits(), ext),
        None => format!("{}_{}.{}", stem, policy, ext),
    }
}

/// Label name derived from the metadata and label dimensions
pub fn label_file_name(metadata: &Metadata, width: u32, height: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}x{}\n", width, height));
    for (key, value) in metadata.iter() {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("label_{}.png", hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ready_file_name() {
        let grey = Some(MatColor::FALLBACK);
        assert_eq!(
            ready_file_name("Irises.jpg", ResizePolicy::Scale, grey),
            "Irises_scaled_333333.jpg"
        );
        assert_eq!(
            ready_file_name("scan.TIFF", ResizePolicy::Crop, None),
            "scan_cropped.png"
        );
        assert_eq!(
            ready_file_name("a.b.png", ResizePolicy::Scale, None),
            "a.b_scaled.png"
        );
    }

    #[test]
    fn test_label_name_depends_on_metadata_and_size() {
        let mut m = Metadata::new();
        m.insert("title", "Irises");

        let a = label_file_name(&m, 1448, 1072);
        assert_eq!(a, label_file_name(&m, 1448, 1072));
        assert_ne!(a, label_file_name(&m, 800, 600));

        m.insert("artist", "Vincent van Gogh");
        assert_ne!(a, label_file_name(&m, 1448, 1072));
    }

    #[test]
    fn test_new_raw_file_invalidates_derived_state() {
        let mut art = ArtFile::new("https://example.com/a.jpg");
        art.set_raw_file("a.jpg".into());
        art.raw_width = Some(10);
        art.raw_height = Some(10);
        art.mat_color = Some(MatColor::FALLBACK);
        art.ready_file = Some("a_scaled_333333.jpg".into());

        art.set_raw_file("a.jpg".into());
        assert_eq!(art.raw_dimensions(), Some((10, 10)));

        art.set_raw_file("b.jpg".into());
        assert_eq!(art.raw_dimensions(), None);
        assert!(art.mat_color.is_none());
        assert!(art.ready_file.is_none());
    }

    #[test]
    fn test_new_ready_file_forgets_device_copy() {
        let mut art = ArtFile::new("https://example.com/a.jpg");
        art.set_raw_file("a.jpg".into());
        art.set_ready_file("a_scaled_333333.jpg".into());
        art.record_remote("MY_F0001".into(), Some("digest".into()));
        assert_eq!(art.cached_thumbnail_hash(), Some("digest"));

        art.set_ready_file("a_cropped.jpg".into());
        assert!(art.remote_content_id.is_none());
        assert!(art.remote_thumbnail_hash.is_none());
        assert_eq!(art.cached_thumbnail_hash(), None);

        art.record_remote("MY_F0002".into(), Some("other".into()));
        art.set_raw_file("b.jpg".into());
        assert!(art.remote_content_id.is_none());
        assert!(art.remote_thumbnail_hash.is_none());
    }

    #[test]
    fn test_digest_for_another_ready_file_is_ignored() {
        let mut art = ArtFile::new("https://example.com/a.jpg");
        art.ready_file = Some("a_scaled.png".into());
        art.record_remote("MY_F0001".into(), Some("digest".into()));

        // Edited by hand, or written before the ready file was tracked
        art.ready_file = Some("a_cropped.png".into());
        assert_eq!(art.cached_thumbnail_hash(), None);

        art.remote_ready_file = None;
        art.ready_file = Some("a_scaled.png".into());
        assert_eq!(art.cached_thumbnail_hash(), None);
    }

    #[test]
    fn test_ready_current_tracks_policy_and_mtime() {
        let dir = TempDir::new().unwrap();
        let layout = FolderLayout::new(dir.path());
        std::fs::create_dir_all(&layout.raw).unwrap();
        std::fs::create_dir_all(&layout.ready).unwrap();

        let mut art = ArtFile::new("https://example.com/a.jpg");
        art.set_raw_file("a.jpg".into());
        std::fs::write(layout.raw.join("a.jpg"), b"raw").unwrap();
        assert!(!art.is_ready_current(&layout, ResizePolicy::Crop));

        art.ready_file = Some("a_cropped.jpg".into());
        std::fs::write(layout.ready.join("a_cropped.jpg"), b"ready").unwrap();
        assert!(art.is_ready_current(&layout, ResizePolicy::Crop));

        // Policy change invalidates
        assert!(!art.is_ready_current(&layout, ResizePolicy::Scale));
    }

    #[test]
    fn test_legacy_aliases() {
        let art: ArtFile = serde_json::from_str(
            r##"{
                "url": "https://example.com/x.png",
                "resize_option": "crop",
                "tv_content_id": "MY_F0001",
                "tv_content_thumb_md5": "abc",
                "metadata": null,
                "mat_color": "#102030"
            }"##,
        )
        .unwrap();

        assert_eq!(art.resize_policy, Some(ResizePolicy::Crop));
        assert_eq!(art.remote_content_id.as_deref(), Some("MY_F0001"));
        assert_eq!(art.remote_thumbnail_hash.as_deref(), Some("abc"));
        assert!(art.metadata.is_empty());
        assert_eq!(art.mat_color, Some(MatColor::from_rgb(0x10, 0x20, 0x30)));
    }
}
