use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, RgbaImage};

use crate::geometry::BoundingBox;

/// Alpha above this value counts as inside an instance.
pub const MASK_ALPHA_THRESHOLD: u8 = 128;

/// Mask encodings a segmentation backend may hand back.
#[derive(Clone, Debug, PartialEq)]
pub enum RawMask {
    /// 8-bit alpha, row-major.
    Alpha {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    /// Per-pixel membership probability in `[0, 1]`, row-major.
    Confidence {
        width: u32,
        height: u32,
        data: Vec<f32>,
    },
    /// Image whose alpha channel marks membership.
    Rgba(RgbaImage),
}

impl RawMask {
    /// Fully opaque rectangle inside an otherwise empty `width x height` mask.
    pub fn rectangle(width: u32, height: u32, rect: BoundingBox) -> RawMask {
        let clipped = rect.clamp_to(width as f32, height as f32);
        let (x0, y0) = (clipped.x.floor() as u32, clipped.y.floor() as u32);
        let (x1, y1) = (clipped.right().ceil() as u32, clipped.bottom().ceil() as u32);
        let mut data = vec![0u8; width as usize * height as usize];
        for y in y0..y1.min(height) {
            for x in x0..x1.min(width) {
                data[y as usize * width as usize + x as usize] = 255;
            }
        }
        RawMask::Alpha {
            width,
            height,
            data,
        }
    }
}

/// Uniform per-instance mask representation: one alpha byte per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct AlphaMask {
    alpha: GrayImage,
}

impl AlphaMask {
    pub fn new(alpha: GrayImage) -> Self {
        Self { alpha }
    }

    /// Normalise any raw encoding to 8-bit alpha.
    pub fn from_raw(raw: &RawMask) -> Result<Self> {
        let alpha = match raw {
            RawMask::Alpha {
                width,
                height,
                data,
            } => {
                check_len(*width, *height, data.len())?;
                GrayImage::from_raw(*width, *height, data.clone())
                    .ok_or_else(|| anyhow!("invalid {}x{} alpha mask", width, height))?
            }
            RawMask::Confidence {
                width,
                height,
                data,
            } => {
                check_len(*width, *height, data.len())?;
                let bytes = data
                    .iter()
                    .map(|&p| {
                        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
                        (p * 255.0).round() as u8
                    })
                    .collect();
                GrayImage::from_raw(*width, *height, bytes)
                    .ok_or_else(|| anyhow!("invalid {}x{} confidence mask", width, height))?
            }
            RawMask::Rgba(image) => {
                let mut alpha = GrayImage::new(image.width(), image.height());
                for (x, y, px) in image.enumerate_pixels() {
                    alpha.put_pixel(x, y, Luma([px.0[3]]));
                }
                alpha
            }
        };
        Ok(Self { alpha })
    }

    pub fn width(&self) -> u32 {
        self.alpha.width()
    }

    pub fn height(&self) -> u32 {
        self.alpha.height()
    }

    /// Nearest-neighbour resample to the given source size.
    pub fn resized_to(&self, width: u32, height: u32) -> AlphaMask {
        if self.alpha.dimensions() == (width, height) {
            return self.clone();
        }
        let (src_w, src_h) = self.alpha.dimensions();
        if src_w == 0 || src_h == 0 {
            return AlphaMask {
                alpha: GrayImage::new(width, height),
            };
        }
        let alpha = GrayImage::from_fn(width, height, |x, y| {
            let sx = ((x as u64 * src_w as u64) / width as u64) as u32;
            let sy = ((y as u64 * src_h as u64) / height as u64) as u32;
            *self.alpha.get_pixel(sx.min(src_w - 1), sy.min(src_h - 1))
        });
        AlphaMask { alpha }
    }

    /// Alpha at the pixel containing `(px, py)`; zero outside the mask.
    pub fn alpha_at(&self, px: f32, py: f32) -> u8 {
        if !(px.is_finite() && py.is_finite()) || px < 0.0 || py < 0.0 {
            return 0;
        }
        let (x, y) = (px.floor() as u32, py.floor() as u32);
        if x >= self.width() || y >= self.height() {
            return 0;
        }
        self.alpha.get_pixel(x, y).0[0]
    }

    pub fn contains(&self, px: f32, py: f32, threshold: u8) -> bool {
        self.alpha_at(px, py) > threshold
    }

    /// Tightest box around pixels with alpha above `threshold`.
    pub fn derive_box(&self, threshold: u8) -> Option<BoundingBox> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, px) in self.alpha.enumerate_pixels() {
            if px.0[0] <= threshold {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        bounds.map(|(x0, y0, x1, y1)| {
            BoundingBox::new(
                x0 as f32,
                y0 as f32,
                (x1 - x0 + 1) as f32,
                (y1 - y0 + 1) as f32,
            )
        })
    }
}

fn check_len(width: u32, height: u32, len: usize) -> Result<()> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("mask dimensions overflow"))?;
    if len != expected {
        return Err(anyhow!(
            "mask length mismatch: expected {}, got {}",
            expected,
            len
        ));
    }
    Ok(())
}

/// One segmented instance with its derived box, in source pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationInstance {
    pub mask: AlphaMask,
    pub derived_box: BoundingBox,
}

impl SegmentationInstance {
    /// Normalise, resize to the source and derive the box. `None` when no
    /// pixel passes `threshold`.
    pub fn from_raw(
        raw: &RawMask,
        source_width: u32,
        source_height: u32,
        threshold: u8,
    ) -> Result<Option<Self>> {
        let mask = AlphaMask::from_raw(raw)?.resized_to(source_width, source_height);
        Ok(mask.derive_box(threshold).map(|derived_box| Self { mask, derived_box }))
    }
}

/// Result of a point-in-mask test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaskHit {
    pub bbox: BoundingBox,
    pub instance_index: usize,
}

/// First instance, in list order, whose mask covers `(px, py)`.
pub fn hit_test_instances(
    instances: &[SegmentationInstance],
    px: f32,
    py: f32,
    threshold: u8,
) -> Option<MaskHit> {
    instances
        .iter()
        .position(|inst| inst.mask.contains(px, py, threshold))
        .map(|instance_index| MaskHit {
            bbox: instances[instance_index].derived_box,
            instance_index,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_mask(width: u32, height: u32, rect: (u32, u32, u32, u32), value: u8) -> RawMask {
        let (x, y, w, h) = rect;
        let bbox = BoundingBox::new(x as f32, y as f32, w as f32, h as f32);
        match RawMask::rectangle(width, height, bbox) {
            RawMask::Alpha { width, height, data } => RawMask::Alpha {
                width,
                height,
                data: data.into_iter().map(|a| if a > 0 { value } else { 0 }).collect(),
            },
            other => other,
        }
    }

    #[test]
    fn derives_tight_box() -> Result<()> {
        let mask = AlphaMask::from_raw(&rect_mask(20, 10, (3, 2, 5, 4), 255))?;
        assert_eq!(
            mask.derive_box(MASK_ALPHA_THRESHOLD),
            Some(BoundingBox::new(3.0, 2.0, 5.0, 4.0))
        );
        Ok(())
    }

    #[test]
    fn threshold_is_exclusive() -> Result<()> {
        let at_threshold = AlphaMask::from_raw(&rect_mask(4, 4, (0, 0, 2, 2), 128))?;
        assert_eq!(at_threshold.derive_box(MASK_ALPHA_THRESHOLD), None);
        assert!(!at_threshold.contains(0.5, 0.5, MASK_ALPHA_THRESHOLD));
        Ok(())
    }

    #[test]
    fn empty_instances_are_dropped() -> Result<()> {
        let empty = rect_mask(8, 8, (0, 0, 0, 0), 255);
        assert!(SegmentationInstance::from_raw(&empty, 8, 8, MASK_ALPHA_THRESHOLD)?.is_none());
        Ok(())
    }

    #[test]
    fn confidence_and_rgba_masks_normalise() -> Result<()> {
        let conf = RawMask::Confidence {
            width: 2,
            height: 1,
            data: vec![0.2, 0.9],
        };
        let mask = AlphaMask::from_raw(&conf)?;
        assert!(!mask.contains(0.0, 0.0, MASK_ALPHA_THRESHOLD));
        assert!(mask.contains(1.0, 0.0, MASK_ALPHA_THRESHOLD));

        let mut rgba = RgbaImage::new(2, 2);
        rgba.put_pixel(1, 1, image::Rgba([0, 0, 0, 200]));
        let mask = AlphaMask::from_raw(&RawMask::Rgba(rgba))?;
        assert_eq!(
            mask.derive_box(MASK_ALPHA_THRESHOLD),
            Some(BoundingBox::new(1.0, 1.0, 1.0, 1.0))
        );
        Ok(())
    }

    #[test]
    fn low_resolution_mask_is_resized_to_source() -> Result<()> {
        let raw = rect_mask(10, 10, (5, 5, 5, 5), 255);
        let inst = SegmentationInstance::from_raw(&raw, 100, 100, MASK_ALPHA_THRESHOLD)?.unwrap();
        assert_eq!(inst.mask.width(), 100);
        assert_eq!(inst.derived_box, BoundingBox::new(50.0, 50.0, 50.0, 50.0));
        Ok(())
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let bad = RawMask::Alpha {
            width: 3,
            height: 3,
            data: vec![0; 8],
        };
        assert!(AlphaMask::from_raw(&bad).is_err());
    }

    #[test]
    fn hit_test_returns_first_instance_in_list_order() -> Result<()> {
        let first = rect_mask(20, 20, (0, 0, 10, 10), 255);
        let second = rect_mask(20, 20, (5, 5, 10, 10), 255);
        let a = SegmentationInstance::from_raw(&first, 20, 20, MASK_ALPHA_THRESHOLD)?.unwrap();
        let b = SegmentationInstance::from_raw(&second, 20, 20, MASK_ALPHA_THRESHOLD)?.unwrap();
        let instances = vec![a, b];
        let hit = hit_test_instances(&instances, 7.0, 7.0, MASK_ALPHA_THRESHOLD).unwrap();
        assert_eq!(hit.instance_index, 0);
        let hit = hit_test_instances(&instances, 12.0, 12.0, MASK_ALPHA_THRESHOLD).unwrap();
        assert_eq!(hit.instance_index, 1);
        assert_eq!(hit.bbox, BoundingBox::new(5.0, 5.0, 10.0, 10.0));
        assert!(hit_test_instances(&instances, 18.0, 2.0, MASK_ALPHA_THRESHOLD).is_none());
        Ok(())
    }
}
