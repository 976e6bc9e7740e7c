//! Image sources handed to the detection pipeline.
//!
//! A `Frame` is a single video frame, canvas snapshot or still photo, always
//! held as RGBA with its intrinsic pixel size. Backends receive a borrowed
//! frame per call and must not keep it past that call.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgba, RgbaImage};

use crate::geometry::BoundingBox;

/// Owned RGBA frame with known intrinsic dimensions.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbaImage,
}

impl Frame {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    /// Wrap a tightly packed RGBA buffer.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = packed_len(width, height, 4)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGBA frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to build {}x{} RGBA frame", width, height))?;
        Ok(Self { image })
    }

    /// Convert a tightly packed RGB buffer, alpha set opaque.
    pub fn from_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Self> {
        let expected = packed_len(width, height, 3)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let mut rgba = Vec::with_capacity(expected / 3 * 4);
        for px in pixels.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Self::from_rgba(rgba, width, height)
    }

    /// Decode an image file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .to_rgba8();
        Ok(Self { image })
    }

    /// Uniformly coloured frame, handy for synthetic sources.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba(color)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Packed RGB bytes, row-major.
    pub fn rgb_bytes(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.width() as usize * self.height() as usize * 3);
        for px in self.image.pixels() {
            rgb.extend_from_slice(&px.0[..3]);
        }
        rgb
    }

    /// Copy out the region under `bbox`, clipped to the frame.
    ///
    /// Fails when the clipped region is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<RgbaImage> {
        let clipped = bbox.clamp_to(self.width() as f32, self.height() as f32);
        let x = clipped.x.floor() as u32;
        let y = clipped.y.floor() as u32;
        let right = (clipped.right().ceil() as u32).min(self.width());
        let bottom = (clipped.bottom().ceil() as u32).min(self.height());
        if right <= x || bottom <= y {
            return Err(anyhow!(
                "crop region {:?} is empty inside {}x{} frame",
                <[f32; 4]>::from(*bbox),
                self.width(),
                self.height()
            ));
        }
        Ok(imageops::crop_imm(&self.image, x, y, right - x, bottom - y).to_image())
    }
}

fn packed_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
