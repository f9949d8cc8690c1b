//! Image and folder fixtures

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tempfile::TempDir;
use tvart_common::FolderLayout;

/// Root folder in a temp dir with every sub-folder created
pub fn test_layout() -> (TempDir, FolderLayout) {
    let dir = TempDir::new().unwrap();
    let layout = FolderLayout::new(dir.path());
    layout.ensure_exists().unwrap();
    (dir, layout)
}

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

/// Horizontal gradient from `left` to `right`, with a darker lower half
pub fn gradient_image(width: u32, height: u32, left: [u8; 3], right: [u8; 3]) -> DynamicImage {
    let raster = RgbImage::from_fn(width, height, |x, y| {
        let t = x as f32 / (width.max(2) - 1) as f32;
        let shade = if y < height / 2 { 1.0 } else { 0.6 };
        let mix = |a: u8, b: u8| ((a as f32 + (b as f32 - a as f32) * t) * shade) as u8;
        Rgb([
            mix(left[0], right[0]),
            mix(left[1], right[1]),
            mix(left[2], right[2]),
        ])
    });
    DynamicImage::ImageRgb8(raster)
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// PNG carrying `tEXt` chunks right after the header
pub fn png_with_text(image: &DynamicImage, text: &[(&str, &str)]) -> Vec<u8> {
    let png = png_bytes(image);
    // signature (8) + IHDR chunk (4 + 4 + 13 + 4)
    let split = 33;
    let mut out = png[..split].to_vec();
    for (key, value) in text {
        let mut data = key.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(value.as_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let mut typed = b"tEXt".to_vec();
        typed.extend_from_slice(&data);
        out.extend_from_slice(&typed);
        out.extend_from_slice(&crc32(&typed).to_be_bytes());
    }
    out.extend_from_slice(&png[split..]);
    out
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        crc ^= b as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}
