//! Pipeline services
//!
//! - **source_resolver**: URL to source kind
//! - **acquisition** / **deep_zoom**: raw image download
//! - **metadata_resolver**: per-source extraction plus key normalization
//! - **color_engine**: mat color decision
//! - **matte**: display compositing
//! - **label**: label rendering seam
//! - **perceptual** / **reconciler**: device synchronization

pub mod acquisition;
pub mod color_engine;
pub mod deep_zoom;
pub mod label;
pub mod matte;
pub mod metadata_resolver;
pub mod perceptual;
pub mod reconciler;
pub mod source_resolver;

pub use acquisition::{Acquirer, DownloadError};
pub use color_engine::{ColorDecision, ColorEngine, ColorSource};
pub use deep_zoom::DeepZoomFetcher;
pub use label::{LabelError, LabelRenderer};
pub use matte::ComposeError;
pub use metadata_resolver::MetadataResolver;
pub use reconciler::{ReconcileError, Reconciler, SyncReport};
pub use source_resolver::{classify, SourceError, SourceKind};
