//! How a source raster is fitted to the display

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResizePolicy {
    /// Fit inside the target, letterboxed with a mat
    #[default]
    #[serde(rename = "scaled", alias = "scale")]
    Scale,
    /// Fill the target, center-cropping the overflow
    #[serde(rename = "cropped", alias = "crop")]
    Crop,
}

impl ResizePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizePolicy::Scale => "scaled",
            ResizePolicy::Crop => "cropped",
        }
    }

    pub fn needs_mat(&self) -> bool {
        matches!(self, ResizePolicy::Scale)
    }
}

impl fmt::Display for ResizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
