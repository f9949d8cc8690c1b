//! Raw image acquisition
//!
//! Direct URLs are a single GET. Gallery and museum sources go through the
//! deep-zoom tool; museum sources first look up their IIIF image through the
//! throttled museum API.

use crate::extractors::museum_api::{MuseumClient, MuseumError};
use crate::services::deep_zoom::{DeepZoomError, DeepZoomFetcher, DeepZoomRequest};
use crate::services::perceptual::content_hash;
use crate::services::source_resolver::{self, SourceError, SourceKind};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Acquisition failure, always tied to the URL that failed
#[derive(Debug, Error)]
#[error("Download of {url} failed: {kind}")]
pub struct DownloadError {
    pub url: String,
    #[source]
    pub kind: DownloadErrorKind,
}

#[derive(Debug, Error)]
pub enum DownloadErrorKind {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Empty response body")]
    EmptyBody,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Write failed: {0}")]
    Write(#[from] tvart_common::Error),

    #[error(transparent)]
    DeepZoom(#[from] DeepZoomError),

    #[error(transparent)]
    Museum(#[from] MuseumError),
}

pub struct Acquirer {
    http: reqwest::Client,
    deep_zoom: DeepZoomFetcher,
    museum: Arc<MuseumClient>,
}

impl Acquirer {
    pub fn new(http: reqwest::Client, deep_zoom: DeepZoomFetcher, museum: Arc<MuseumClient>) -> Self {
        Self {
            http,
            deep_zoom,
            museum,
        }
    }

    /// Fetch `url` into `dest_dir`, returning the written file
    pub async fn acquire(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        self.acquire_inner(url, dest_dir)
            .await
            .map_err(|kind| DownloadError {
                url: url.to_string(),
                kind,
            })
    }

    async fn acquire_inner(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadErrorKind> {
        let kind = source_resolver::classify(url)?;
        info!(url = %url, source = %kind, "Acquiring");

        let path = match kind {
            SourceKind::DirectHttp => self.fetch_direct(url, dest_dir).await?,
            SourceKind::DeepZoomGallery => {
                self.deep_zoom
                    .fetch(DeepZoomRequest {
                        url,
                        dest_dir,
                        output_name: None,
                        referer: None,
                    })
                    .await?
            }
            SourceKind::MuseumApi => {
                let source = self.museum.image_source(url).await?;
                debug!(info_url = %source.info_url, file = %source.file_name, "Museum image located");

                // The IIIF server sits behind the same rate limit
                self.museum
                    .throttle()
                    .throttled(|| {
                        self.deep_zoom.fetch(DeepZoomRequest {
                            url: &source.info_url,
                            dest_dir,
                            output_name: Some(&source.file_name),
                            referer: Some(url),
                        })
                    })
                    .await?
            }
        };

        info!(url = %url, path = %path.display(), "Acquired");
        Ok(path)
    }

    async fn fetch_direct(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadErrorKind> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadErrorKind::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadErrorKind::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadErrorKind::Network(e.to_string()))?;
        if body.is_empty() {
            return Err(DownloadErrorKind::EmptyBody);
        }

        let parsed = source_resolver::parse(url)?;
        let path = dest_dir.join(direct_file_name(&parsed, content_type.as_deref()));
        tvart_common::fs::write_atomic(&path, &body)?;
        debug!(url = %url, bytes = body.len(), "Direct download complete");
        Ok(path)
    }
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|c| c.split(';').next())
        .map(|c| c.trim().to_ascii_lowercase());
    match essence.as_deref() {
        Some("image/png") => "png",
        Some("image/tiff") => "tif",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/bmp") => "bmp",
        _ => "jpg",
    }
}

/// `<sanitized last path segment>-<url digest>.<ext>`
///
/// The digest keeps generic names (IIIF `default.jpg`) from colliding.
pub fn direct_file_name(url: &Url, content_type: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut s| s.rfind(|seg| !seg.is_empty()))
        .unwrap_or_default();

    let (stem, ext) = match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && (1..=5).contains(&ext.len()) => {
            (stem.to_string(), ext.to_ascii_lowercase())
        }
        _ => (segment.to_string(), extension_for(content_type).to_string()),
    };

    let clean: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(80)
        .collect();
    let clean = if clean.trim_matches('_').is_empty() {
        "image".to_string()
    } else {
        clean
    };

    let digest = content_hash(url.as_str().as_bytes());
    format!("{}-{}.{}", clean, &digest[..8], ext)
}
