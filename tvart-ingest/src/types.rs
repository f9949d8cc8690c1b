//! Metadata extraction seam
//!
//! Each source kind has one extractor producing raw `(field, value)` pairs.
//! Field names are whatever the source uses; normalization onto canonical
//! keys happens afterwards in the metadata resolver.

use crate::services::source_resolver::SourceKind;
use std::path::PathBuf;
use thiserror::Error;

/// Raw, un-normalized fields in source order
pub type RawFields = Vec<(String, String)>;

/// What an extractor gets to work with
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub url: String,
    pub source_kind: SourceKind,
    /// Acquired raw file, when there is one
    pub raw_path: Option<PathBuf>,
}

#[async_trait::async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Extractor name for logging
    fn name(&self) -> &'static str;

    async fn extract(&self, ctx: &ExtractionContext) -> Result<RawFields, MetadataError>;
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No extractor for {0}")]
    Unsupported(String),
}
