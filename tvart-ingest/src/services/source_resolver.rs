//! URL classification

use reqwest::Url;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Malformed URL '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme { url: String, scheme: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Tiled gallery viewer, fetched through the deep-zoom tool
    DeepZoomGallery,
    /// Museum collection with a public JSON API
    MuseumApi,
    /// Plain image URL
    DirectHttp,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::DeepZoomGallery => "deep-zoom gallery",
            SourceKind::MuseumApi => "museum API",
            SourceKind::DirectHttp => "direct HTTP",
        })
    }
}

const GALLERY_HOST: &str = "artsandculture.google.com";
const MUSEUM_HOST: &str = "www.artic.edu";
const MUSEUM_PATH_PREFIX: &str = "/artworks";

/// Classify a source URL. Unknown hosts are plain HTTP downloads.
pub fn classify(url: &str) -> Result<SourceKind, SourceError> {
    let parsed = parse(url)?;
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    if host == GALLERY_HOST {
        return Ok(SourceKind::DeepZoomGallery);
    }
    if host == MUSEUM_HOST && parsed.path().starts_with(MUSEUM_PATH_PREFIX) {
        return Ok(SourceKind::MuseumApi);
    }
    Ok(SourceKind::DirectHttp)
}

pub(crate) fn parse(url: &str) -> Result<Url, SourceError> {
    let parsed = Url::parse(url.trim()).map_err(|e| SourceError::MalformedUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(SourceError::UnsupportedScheme {
            url: url.to_string(),
            scheme: other.to_string(),
        }),
    }
}
