//! Deterministic colour fingerprint used when no feature model is loaded.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::vector::{EmbeddingSource, EmbeddingVector};

/// Side of the square the crop is resampled to.
pub const FINGERPRINT_SIZE: u32 = 32;

/// Largest accepted fingerprint side.
pub const MAX_FINGERPRINT_SIZE: u32 = 256;

/// Resize `crop` to `size x size` and flatten its RGB channels scaled to
/// `[0, 1]`. Alpha is ignored.
pub fn fingerprint(crop: &RgbaImage, size: u32) -> Result<EmbeddingVector> {
    if !(1..=MAX_FINGERPRINT_SIZE).contains(&size) {
        return Err(anyhow!(
            "fingerprint size must be within 1..={}, got {}",
            MAX_FINGERPRINT_SIZE,
            size
        ));
    }
    if crop.width() == 0 || crop.height() == 0 {
        return Err(anyhow!(
            "cannot fingerprint an empty {}x{} crop",
            crop.width(),
            crop.height()
        ));
    }
    let small = imageops::resize(crop, size, size, FilterType::Triangle);
    let mut values = Vec::with_capacity(size as usize * size as usize * 3);
    for px in small.pixels() {
        values.extend(px.0[..3].iter().map(|&c| c as f32 / 255.0));
    }
    Ok(EmbeddingVector::new(
        EmbeddingSource::Fingerprint { size },
        values,
    ))
}
