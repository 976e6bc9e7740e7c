use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::surface::{Color, Surface, APPROX_ADVANCE};
use crate::geometry::{BoundingBox, FitRect};
use crate::segment::SegmentationInstance;

/// Surface backed by an RGBA image, drawn with `imageproc`.
///
/// Without a font, labels are measured approximately and text drawing is a
/// no-op; backgrounds and boxes are still drawn.
pub struct RasterSurface {
    image: RgbaImage,
    font: Option<FontArc>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            font: None,
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TTF/OTF font for label text.
    pub fn with_font_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
        Ok(self.with_font(font))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Integer pixel rect covering `rect`, clipped to the canvas.
    fn pixel_rect(&self, rect: &BoundingBox) -> Option<Rect> {
        let clipped = rect.clamp_to(self.image.width() as f32, self.image.height() as f32);
        let x0 = clipped.x.floor() as i32;
        let y0 = clipped.y.floor() as i32;
        let x1 = clipped.right().ceil() as i32;
        let y1 = clipped.bottom().ceil() as i32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32))
    }
}

fn blend(dst: &mut Rgba<u8>, color: Color) {
    let alpha = color.0[3] as f32 / 255.0;
    for c in 0..3 {
        let mixed = dst.0[c] as f32 * (1.0 - alpha) + color.0[c] as f32 * alpha;
        dst.0[c] = mixed.round() as u8;
    }
    let out_alpha = dst.0[3] as f32 / 255.0 + alpha * (1.0 - dst.0[3] as f32 / 255.0);
    dst.0[3] = (out_alpha * 255.0).round() as u8;
}

impl Surface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: f32) {
        let inset_steps = line_width.round().max(1.0) as i32;
        for inset in 0..inset_steps {
            let inner = BoundingBox::new(
                rect.x + inset as f32,
                rect.y + inset as f32,
                rect.width - 2.0 * inset as f32,
                rect.height - 2.0 * inset as f32,
            );
            if inner.is_empty() {
                break;
            }
            if let Some(r) = self.pixel_rect(&inner) {
                draw_hollow_rect_mut(&mut self.image, r, Rgba(color.0));
            }
        }
    }

    fn fill_rect(&mut self, rect: &BoundingBox, color: Color) {
        if let Some(r) = self.pixel_rect(rect) {
            draw_filled_rect_mut(&mut self.image, r, Rgba(color.0));
        }
    }

    fn hatch_mask(
        &mut self,
        instance: &SegmentationInstance,
        fit: &FitRect,
        threshold: u8,
        color: Color,
        spacing: u32,
    ) {
        let spacing = spacing.max(2);
        let mask = &instance.mask;
        let Some(area) = self.pixel_rect(&fit.box_to_viewport(&instance.derived_box)) else {
            return;
        };
        for y in area.top()..=area.bottom() {
            for x in area.left()..=area.right() {
                if (x + y).rem_euclid(spacing as i32) != 0 {
                    continue;
                }
                let Some((sx, sy)) = fit.viewport_to_source(x as f32 + 0.5, y as f32 + 0.5)
                else {
                    continue;
                };
                if mask.contains(sx, sy, threshold) {
                    blend(self.image.get_pixel_mut(x as u32, y as u32), color);
                }
            }
        }
    }

    fn measure_text(&self, text: &str, font_size: f32) -> (f32, f32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(font_size), font, text);
                (w as f32, h as f32)
            }
            None => (text.chars().count() as f32 * font_size * APPROX_ADVANCE, font_size),
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, font_size: f32, color: Color) {
        let Some(font) = &self.font else {
            log::trace!("no font loaded, skipping label '{}'", text);
            return;
        };
        draw_text_mut(
            &mut self.image,
            Rgba(color.0),
            x.round() as i32,
            y.round() as i32,
            PxScale::from(font_size),
            font,
            text,
        );
    }
}
