//! Histogram-based brightness score for captured frames

use crate::error::DecodeError;
use image::DynamicImage;
use std::path::Path;

/// Number of luminance buckets, also the normalisation scale.
const SCALE: usize = 256;

/// Compute a brightness score in `[0, 1]` from the luminance histogram.
///
/// The accumulation starts at the scale and adds each bucket's share of
/// `index - scale`, which leaves the mean luminance. A raw value of exactly
/// 255 (an all-white frame) maps to `1.0`.
pub fn estimate_brightness(image: &DynamicImage) -> f64 {
    let histogram = luma_histogram(image);
    let pixels: u64 = histogram.iter().sum();
    if pixels == 0 {
        return 0.0;
    }

    let scale = SCALE as f64;
    let mut brightness = scale;
    for (index, count) in histogram.iter().enumerate() {
        let ratio = *count as f64 / pixels as f64;
        brightness += ratio * (-scale + index as f64);
    }

    if brightness == 255.0 {
        1.0
    } else {
        brightness / scale
    }
}

/// Decode in-memory image bytes (format sniffed from content) and score them.
pub fn brightness_from_bytes(bytes: &[u8]) -> Result<f64, DecodeError> {
    let image = image::load_from_memory(bytes)?;
    Ok(estimate_brightness(&image))
}

/// Read an image file from disk and score it.
pub fn brightness_from_path(path: impl AsRef<Path>) -> Result<f64, DecodeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    brightness_from_bytes(&bytes)
}

/// Luminance uses ITU-R 601 integer weights so scores match archives
/// produced with PIL's `convert("L")`. 8-bit grey frames are taken as-is.
fn luma_histogram(image: &DynamicImage) -> [u64; SCALE] {
    let mut histogram = [0u64; SCALE];
    match image {
        DynamicImage::ImageLuma8(gray) => {
            for pixel in gray.pixels() {
                histogram[pixel.0[0] as usize] += 1;
            }
        }
        _ => {
            for pixel in image.to_rgb8().pixels() {
                histogram[rec601_luma(pixel.0) as usize] += 1;
            }
        }
    }
    histogram
}

fn rec601_luma([r, g, b]: [u8; 3]) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}
