use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::BoundingBox;

/// How a source image is laid out inside its viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Letterboxed: the whole image is visible.
    #[default]
    Contain,
    /// Cropped: the image fills the viewport.
    Cover,
}

impl FromStr for FitMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contain" => Ok(FitMode::Contain),
            "cover" => Ok(FitMode::Cover),
            other => Err(anyhow!("unknown fit mode '{}', use contain or cover", other)),
        }
    }
}

/// Placement of a source image inside a viewport.
///
/// Derived on every layout change and never persisted. All fields are in
/// viewport pixels except the cover crop origin, which is in source pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FitRect {
    Contain {
        scale: f32,
        display_width: f32,
        display_height: f32,
        offset_x: f32,
        offset_y: f32,
    },
    Cover {
        scale: f32,
        source_offset_x: f32,
        source_offset_y: f32,
        display_width: f32,
        display_height: f32,
    },
}

/// Scale the source to fit entirely inside the viewport, centred.
///
/// An unknown (zero) source size yields an identity rect covering the viewport.
pub fn compute_contain_rect(
    viewport_width: f32,
    viewport_height: f32,
    source_width: f32,
    source_height: f32,
) -> FitRect {
    if source_width <= 0.0 || source_height <= 0.0 {
        return FitRect::Contain {
            scale: 1.0,
            display_width: viewport_width,
            display_height: viewport_height,
            offset_x: 0.0,
            offset_y: 0.0,
        };
    }
    let scale = f32::min(
        viewport_width / source_width,
        viewport_height / source_height,
    );
    let display_width = source_width * scale;
    let display_height = source_height * scale;
    FitRect::Contain {
        scale,
        display_width,
        display_height,
        offset_x: (viewport_width - display_width) / 2.0,
        offset_y: (viewport_height - display_height) / 2.0,
    }
}

/// Scale the source to cover the viewport, cropping the overflow evenly.
pub fn compute_cover_rect(
    viewport_width: f32,
    viewport_height: f32,
    source_width: f32,
    source_height: f32,
) -> FitRect {
    if source_width <= 0.0 || source_height <= 0.0 {
        return FitRect::Cover {
            scale: 1.0,
            source_offset_x: 0.0,
            source_offset_y: 0.0,
            display_width: viewport_width,
            display_height: viewport_height,
        };
    }
    let scale = f32::max(
        viewport_width / source_width,
        viewport_height / source_height,
    );
    // Visible part of the source, in source pixels.
    let visible_width = if scale > 0.0 { viewport_width / scale } else { source_width };
    let visible_height = if scale > 0.0 { viewport_height / scale } else { source_height };
    FitRect::Cover {
        scale,
        source_offset_x: (source_width - visible_width) / 2.0,
        source_offset_y: (source_height - visible_height) / 2.0,
        display_width: source_width * scale,
        display_height: source_height * scale,
    }
}

impl FitRect {
    pub fn compute(
        mode: FitMode,
        viewport_width: f32,
        viewport_height: f32,
        source_width: f32,
        source_height: f32,
    ) -> Self {
        match mode {
            FitMode::Contain => {
                compute_contain_rect(viewport_width, viewport_height, source_width, source_height)
            }
            FitMode::Cover => {
                compute_cover_rect(viewport_width, viewport_height, source_width, source_height)
            }
        }
    }

    pub fn mode(&self) -> FitMode {
        match self {
            FitRect::Contain { .. } => FitMode::Contain,
            FitRect::Cover { .. } => FitMode::Cover,
        }
    }

    pub fn scale(&self) -> f32 {
        match *self {
            FitRect::Contain { scale, .. } | FitRect::Cover { scale, .. } => scale,
        }
    }

    pub fn display_size(&self) -> (f32, f32) {
        match *self {
            FitRect::Contain {
                display_width,
                display_height,
                ..
            }
            | FitRect::Cover {
                display_width,
                display_height,
                ..
            } => (display_width, display_height),
        }
    }

    /// Top-left of the scaled image in viewport pixels. Negative in cover mode.
    pub fn screen_offset(&self) -> (f32, f32) {
        match *self {
            FitRect::Contain {
                offset_x, offset_y, ..
            } => (offset_x, offset_y),
            FitRect::Cover {
                scale,
                source_offset_x,
                source_offset_y,
                ..
            } => (-source_offset_x * scale, -source_offset_y * scale),
        }
    }

    pub fn source_to_viewport(&self, x: f32, y: f32) -> (f32, f32) {
        let scale = self.scale();
        let (ox, oy) = self.screen_offset();
        (x * scale + ox, y * scale + oy)
    }

    /// Inverse of `source_to_viewport`; `None` when the scale collapsed to zero.
    pub fn viewport_to_source(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let scale = self.scale();
        if scale <= 0.0 || !scale.is_finite() {
            return None;
        }
        let (ox, oy) = self.screen_offset();
        Some(((x - ox) / scale, (y - oy) / scale))
    }

    pub fn box_to_viewport(&self, bbox: &BoundingBox) -> BoundingBox {
        let (x, y) = self.source_to_viewport(bbox.x, bbox.y);
        let scale = self.scale();
        BoundingBox::new(x, y, bbox.width * scale, bbox.height * scale)
    }

    /// The scaled image rectangle in viewport pixels.
    pub fn display_bounds(&self) -> BoundingBox {
        let (ox, oy) = self.screen_offset();
        let (w, h) = self.display_size();
        BoundingBox::new(ox, oy, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const EPS: f32 = 1e-3;

    #[test]
    fn contain_letterboxes_wide_source() {
        let rect = compute_contain_rect(400.0, 400.0, 800.0, 400.0);
        assert_eq!(
            rect,
            FitRect::Contain {
                scale: 0.5,
                display_width: 400.0,
                display_height: 200.0,
                offset_x: 0.0,
                offset_y: 100.0,
            }
        );
    }

    #[test]
    fn cover_crops_wide_source() {
        let rect = compute_cover_rect(400.0, 400.0, 800.0, 400.0);
        assert_eq!(
            rect,
            FitRect::Cover {
                scale: 1.0,
                source_offset_x: 200.0,
                source_offset_y: 0.0,
                display_width: 800.0,
                display_height: 400.0,
            }
        );
        assert_eq!(rect.screen_offset(), (-200.0, -0.0));
    }

    #[test]
    fn unknown_source_size_yields_identity() {
        let contain = compute_contain_rect(320.0, 240.0, 0.0, 100.0);
        assert_eq!(contain.display_size(), (320.0, 240.0));
        assert_eq!(contain.screen_offset(), (0.0, 0.0));
        let cover = compute_cover_rect(320.0, 240.0, 100.0, 0.0);
        assert_eq!(cover.display_size(), (320.0, 240.0));
        assert_eq!(cover.screen_offset(), (-0.0, -0.0));
        assert_eq!(cover.scale(), 1.0);
    }

    #[test]
    fn contain_stays_inside_and_centred_for_random_sizes() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let vw = rng.gen_range(1.0..2000.0f32);
            let vh = rng.gen_range(1.0..2000.0f32);
            let sw = rng.gen_range(1.0..4000.0f32);
            let sh = rng.gen_range(1.0..4000.0f32);
            let FitRect::Contain {
                display_width,
                display_height,
                offset_x,
                offset_y,
                ..
            } = compute_contain_rect(vw, vh, sw, sh)
            else {
                panic!("contain fit must produce a contain rect");
            };
            assert!(display_width <= vw + EPS * vw);
            assert!(display_height <= vh + EPS * vh);
            assert!((offset_x - (vw - display_width) / 2.0).abs() < EPS * vw.max(1.0));
            assert!((offset_y - (vh - display_height) / 2.0).abs() < EPS * vh.max(1.0));
        }
    }

    #[test]
    fn cover_always_fills_viewport_for_random_sizes() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let vw = rng.gen_range(1.0..2000.0f32);
            let vh = rng.gen_range(1.0..2000.0f32);
            let sw = rng.gen_range(1.0..4000.0f32);
            let sh = rng.gen_range(1.0..4000.0f32);
            let rect = compute_cover_rect(vw, vh, sw, sh);
            let (dw, dh) = rect.display_size();
            assert!(dw >= vw * (1.0 - EPS));
            assert!(dh >= vh * (1.0 - EPS));
        }
    }

    #[test]
    fn viewport_mapping_round_trips() {
        for rect in [
            compute_contain_rect(300.0, 500.0, 640.0, 480.0),
            compute_cover_rect(300.0, 500.0, 640.0, 480.0),
        ] {
            let (vx, vy) = rect.source_to_viewport(123.0, 321.0);
            let (sx, sy) = rect.viewport_to_source(vx, vy).unwrap();
            assert!((sx - 123.0).abs() < EPS);
            assert!((sy - 321.0).abs() < EPS);
        }
    }

    #[test]
    fn viewport_centre_maps_to_source_centre() {
        for mode in [FitMode::Contain, FitMode::Cover] {
            let rect = FitRect::compute(mode, 390.0, 844.0, 1280.0, 720.0);
            let (sx, sy) = rect.viewport_to_source(195.0, 422.0).unwrap();
            assert!((sx - 640.0).abs() < 0.01, "{mode:?} x={sx}");
            assert!((sy - 360.0).abs() < 0.01, "{mode:?} y={sy}");
        }
    }

    #[test]
    fn parses_fit_mode() {
        assert_eq!("Cover".parse::<FitMode>().unwrap(), FitMode::Cover);
        assert_eq!(" contain ".parse::<FitMode>().unwrap(), FitMode::Contain);
        assert!("stretch".parse::<FitMode>().is_err());
    }
}
