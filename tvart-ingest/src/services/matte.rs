//! Display compositing
//!
//! Geometry is planned first as plain integers ([`plan_layout`]) and then
//! rendered with `image`. `Scale` letterboxes on a mat; `Crop` fills the
//! target and trims the overflow evenly on both sides.

use crate::models::art_file::is_lossless;
use crate::models::{MatColor, ResizePolicy};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Scale policy needs a mat color")]
    MissingMatColor,

    #[error("Invalid dimensions {0}x{1}")]
    InvalidDimensions(u32, u32),

    #[error("Write failed: {0}")]
    Write(#[from] tvart_common::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where the resized source lands on the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Source already matches the target exactly
    Unchanged,
    /// Same aspect as the target: keep the source size, no mat
    Reformat { width: u32, height: u32 },
    /// Resize, then center on a mat-filled canvas
    Letterbox {
        scaled_width: u32,
        scaled_height: u32,
        offset_x: u32,
        offset_y: u32,
    },
    /// Resize to cover the target, then cut out the center
    Crop {
        scaled_width: u32,
        scaled_height: u32,
        crop: CropRect,
    },
}

impl Layout {
    pub fn draws_mat(&self) -> bool {
        matches!(self, Layout::Letterbox { .. })
    }
}

#[derive(Debug, Clone)]
pub enum Composed {
    Unchanged,
    Rendered(RgbImage),
}

fn scaled_len(len: u32, numerator: u32, denominator: u32) -> u32 {
    let exact = len as u64 * numerator as u64;
    let rounded = (exact + denominator as u64 / 2) / denominator as u64;
    rounded.max(1) as u32
}

/// Plan the output geometry
pub fn plan_layout(
    source: (u32, u32),
    target: (u32, u32),
    policy: ResizePolicy,
) -> Result<Layout, ComposeError> {
    let (sw, sh) = source;
    let (tw, th) = target;
    if sw == 0 || sh == 0 {
        return Err(ComposeError::InvalidDimensions(sw, sh));
    }
    if tw == 0 || th == 0 {
        return Err(ComposeError::InvalidDimensions(tw, th));
    }
    if (sw, sh) == (tw, th) {
        return Ok(Layout::Unchanged);
    }

    // Compare aspects exactly: sw/sh vs tw/th
    let source_side = sw as u64 * th as u64;
    let target_side = sh as u64 * tw as u64;
    let wider = source_side > target_side;

    match policy {
        ResizePolicy::Scale => {
            if source_side == target_side {
                return Ok(Layout::Reformat {
                    width: sw,
                    height: sh,
                });
            }
            let (scaled_width, scaled_height) = if wider {
                (tw, scaled_len(sh, tw, sw).min(th))
            } else {
                (scaled_len(sw, th, sh).min(tw), th)
            };
            Ok(Layout::Letterbox {
                scaled_width,
                scaled_height,
                offset_x: (tw - scaled_width) / 2,
                offset_y: (th - scaled_height) / 2,
            })
        }
        ResizePolicy::Crop => {
            let (scaled_width, scaled_height) = if wider {
                (scaled_len(sw, th, sh).max(tw), th)
            } else {
                (tw, scaled_len(sh, tw, sw).max(th))
            };
            Ok(Layout::Crop {
                scaled_width,
                scaled_height,
                crop: CropRect {
                    x: (scaled_width - tw) / 2,
                    y: (scaled_height - th) / 2,
                    width: tw,
                    height: th,
                },
            })
        }
    }
}

/// Compose the display raster for `image`
pub fn compose(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    policy: ResizePolicy,
    mat_color: Option<MatColor>,
) -> Result<Composed, ComposeError> {
    let layout = plan_layout(
        (image.width(), image.height()),
        (target_width, target_height),
        policy,
    )?;

    let raster = match layout {
        Layout::Unchanged => return Ok(Composed::Unchanged),
        Layout::Reformat { .. } => image.to_rgb8(),
        Layout::Letterbox {
            scaled_width,
            scaled_height,
            offset_x,
            offset_y,
        } => {
            let mat = mat_color.ok_or(ComposeError::MissingMatColor)?;
            let scaled = image
                .resize_exact(scaled_width, scaled_height, FilterType::Lanczos3)
                .to_rgb8();
            let mut canvas = RgbImage::from_pixel(target_width, target_height, mat.to_pixel());
            imageops::replace(&mut canvas, &scaled, offset_x as i64, offset_y as i64);
            canvas
        }
        Layout::Crop {
            scaled_width,
            scaled_height,
            crop,
        } => image
            .resize_exact(scaled_width, scaled_height, FilterType::Lanczos3)
            .crop_imm(crop.x, crop.y, crop.width, crop.height)
            .to_rgb8(),
    };

    Ok(Composed::Rendered(raster))
}

/// Encode as PNG for lossless targets, JPEG otherwise
pub fn encode(raster: &RgbImage, output_name: &str) -> Result<Vec<u8>, ComposeError> {
    let mut buf = Vec::new();
    if is_lossless(output_name) {
        raster.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    } else {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
        encoder.encode_image(raster)?;
    }
    Ok(buf)
}

/// Decode `raw`, compose and write `ready` atomically
pub fn render_ready_file(
    raw: &Path,
    ready: &Path,
    target: (u32, u32),
    policy: ResizePolicy,
    mat_color: Option<MatColor>,
) -> Result<(), ComposeError> {
    let image = decode(raw)?;
    write_ready(&image, raw, ready, target, policy, mat_color)
}

/// Compose an already decoded `raw` and write `ready` atomically.
///
/// An unchanged source with the same encoding is copied byte for byte.
pub fn write_ready(
    image: &DynamicImage,
    raw: &Path,
    ready: &Path,
    target: (u32, u32),
    policy: ResizePolicy,
    mat_color: Option<MatColor>,
) -> Result<(), ComposeError> {
    let ready_name = ready
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let bytes = match compose(image, target.0, target.1, policy, mat_color)? {
        Composed::Unchanged => {
            let raw_name = raw.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let same_encoding = is_lossless(raw_name) == is_lossless(ready_name)
                && (is_lossless(raw_name) || is_jpeg(raw_name));
            if same_encoding {
                std::fs::read(raw)?
            } else {
                encode(&image.to_rgb8(), ready_name)?
            }
        }
        Composed::Rendered(raster) => encode(&raster, ready_name)?,
    };

    tvart_common::fs::write_atomic(ready, &bytes)?;
    Ok(())
}

/// Decode without the default allocation limits; museum scans are large
pub fn decode(path: &Path) -> Result<DynamicImage, ComposeError> {
    let mut reader = image::ImageReader::open(path)?.with_guessed_format()?;
    reader.no_limits();
    Ok(reader.decode()?)
}

/// Image dimensions from the file header only
pub fn measure(path: &Path) -> Result<(u32, u32), ComposeError> {
    Ok(image::ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()?)
}

fn is_jpeg(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}
