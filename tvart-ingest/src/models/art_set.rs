//! Ordered collection of artworks bound to one manifest file

use crate::models::{ArtFile, ResizePolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    #[error("Manifest {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Manifest {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("Manifest {path} has unsupported schema version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("Manifest I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest write failed: {0}")]
    Write(#[from] tvart_common::Error),
}

/// On-disk shape of a manifest
#[derive(Debug, Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, alias = "default_resize")]
    default_resize_policy: ResizePolicy,
    #[serde(default)]
    art: Option<Vec<ArtFile>>,
}

#[derive(Debug, Clone)]
pub struct ArtSet {
    pub name: Option<String>,
    pub default_resize_policy: ResizePolicy,
    pub art: Vec<ArtFile>,
    path: PathBuf,
}

impl ArtSet {
    pub fn new(path: impl Into<PathBuf>, default_resize_policy: ResizePolicy) -> Self {
        Self {
            name: None,
            default_resize_policy,
            art: Vec::new(),
            path: path.into(),
        }
    }

    /// Build a set from a URL list, one item per URL, duplicates dropped
    pub fn from_urls<I, S>(
        path: impl Into<PathBuf>,
        name: Option<String>,
        default_resize_policy: ResizePolicy,
        urls: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let art = urls
            .into_iter()
            .map(Into::into)
            .filter(|u: &String| seen.insert(u.clone()))
            .map(ArtFile::new)
            .collect();

        Self {
            name,
            default_resize_policy,
            art,
            path: path.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(ManifestError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let doc: ManifestDocument =
            serde_json::from_str(&content).map_err(|e| ManifestError::Corrupt {
                path: path.to_path_buf(),
                source: e,
            })?;

        if let Some(version) = doc.schema_version {
            if version > SCHEMA_VERSION {
                return Err(ManifestError::UnsupportedVersion {
                    path: path.to_path_buf(),
                    version,
                });
            }
        }

        let art = doc.art.unwrap_or_default();
        let mut seen = HashSet::new();
        for item in &art {
            if item.url.trim().is_empty() {
                return Err(ManifestError::Invalid {
                    path: path.to_path_buf(),
                    reason: "art entry with empty url".to_string(),
                });
            }
            if !seen.insert(item.url.as_str()) {
                return Err(ManifestError::Invalid {
                    path: path.to_path_buf(),
                    reason: format!("duplicate url {}", item.url),
                });
            }
        }

        tracing::debug!(path = %path.display(), items = art.len(), "Loaded manifest");

        Ok(Self {
            name: doc.name,
            default_resize_policy: doc.default_resize_policy,
            art,
            path: path.to_path_buf(),
        })
    }

    /// Persist atomically (temp file + rename)
    pub fn save(&self) -> Result<(), ManifestError> {
        let doc = ManifestDocument {
            schema_version: Some(SCHEMA_VERSION),
            name: self.name.clone(),
            default_resize_policy: self.default_resize_policy,
            art: Some(self.art.clone()),
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        doc.serialize(&mut ser)
            .map_err(|e| ManifestError::Write(e.into()))?;
        buf.push(b'\n');

        tvart_common::fs::write_atomic(&self.path, &buf)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name: explicit name, else the manifest file stem
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    pub fn len(&self) -> usize {
        self.art.len()
    }

    pub fn is_empty(&self) -> bool {
        self.art.is_empty()
    }
}

/// URLs from a text list: one per line, blank lines and `#` comments skipped
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
