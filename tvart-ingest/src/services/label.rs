//! Label rendering seam
//!
//! Typesetting is external; the pipeline only decides when a label is due
//! and where it goes.

use crate::models::Metadata;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Nothing to render: metadata is empty")]
    EmptyMetadata,

    #[error("Label rendering failed: {0}")]
    Render(String),
}

pub trait LabelRenderer: Send + Sync {
    /// Render `metadata` onto a `width` x `height` raster
    fn render(&self, metadata: &Metadata, width: u32, height: u32) -> Result<RgbImage, LabelError>;
}
