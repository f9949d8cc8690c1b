//! Error types for the artwork pipeline

use crate::models::ManifestError;
use crate::services::{ComposeError, DownloadError, ReconcileError, SourceError};
use thiserror::Error;

/// Failure of one artwork, or of pipeline setup
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Acquisition reported success but left no usable file name
    #[error("No raw file recorded for {url}")]
    MissingRaw { url: String },

    #[error("Compositing {url} failed: {source}")]
    Compose {
        url: String,
        #[source]
        source: ComposeError,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Common error: {0}")]
    Common(#[from] tvart_common::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
