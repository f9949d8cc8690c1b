//! Perceptual comparison of device thumbnails against ready files
//!
//! The device re-encodes uploads and returns its own thumbnails, so bytes
//! never match. Both sides are reduced to a small blurred RGB grid and
//! compared by mean absolute channel difference.

use image::imageops::FilterType;
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::path::Path;

pub const DIGEST_WIDTH: u32 = 64;
pub const DIGEST_HEIGHT: u32 = 36;

const WORKING_WIDTH: u32 = 256;
const WORKING_HEIGHT: u32 = 144;
const BLUR_SIGMA: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerceptualDigest {
    pixels: Vec<u8>,
}

impl PerceptualDigest {
    pub fn from_image(image: &DynamicImage) -> Self {
        let working = image.resize_exact(WORKING_WIDTH, WORKING_HEIGHT, FilterType::Triangle);
        let blurred = working.blur(BLUR_SIGMA);
        let grid = blurred.resize_exact(DIGEST_WIDTH, DIGEST_HEIGHT, FilterType::Triangle);
        Self {
            pixels: grid.to_rgb8().into_raw(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        Ok(Self::from_image(&image::load_from_memory(bytes)?))
    }

    pub fn from_path(path: &Path) -> Result<Self, image::ImageError> {
        Ok(Self::from_image(&image::open(path)?))
    }

    /// Mean absolute channel difference in [0, 1]
    pub fn distance(&self, other: &PerceptualDigest) -> f32 {
        if self.pixels.len() != other.pixels.len() || self.pixels.is_empty() {
            return 1.0;
        }
        let total: u64 = self
            .pixels
            .iter()
            .zip(&other.pixels)
            .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs() as u64)
            .sum();
        total as f32 / (self.pixels.len() as f32 * 255.0)
    }

    pub fn matches(&self, other: &PerceptualDigest, threshold: f32) -> bool {
        self.distance(other) < threshold
    }
}

/// Hex SHA-256 of raw bytes, cached per item to skip perceptual work
pub fn content_hash(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
