use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, FitRect};
use crate::segment::SegmentationInstance;

/// Straight (non-premultiplied) RGBA colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color([r, g, b, a])
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color([r, g, b, 255])
    }
}

/// 2D drawing target sized to the viewport. All coordinates are viewport
/// pixels except masks, which are placed through a `FitRect`.
pub trait Surface {
    fn size(&self) -> (u32, u32);

    /// Resize the backing store; contents are discarded.
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: f32);

    fn fill_rect(&mut self, rect: &BoundingBox, color: Color);

    /// Diagonal hatch over the instance's derived box, confined to mask
    /// pixels above `threshold`.
    fn hatch_mask(
        &mut self,
        instance: &SegmentationInstance,
        fit: &FitRect,
        threshold: u8,
        color: Color,
        spacing: u32,
    );

    /// Width and height of `text` at `font_size`.
    fn measure_text(&self, text: &str, font_size: f32) -> (f32, f32);

    /// Draw `text` with its top-left corner at `(x, y)`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, font_size: f32, color: Color);
}

/// Everything drawn on a `RecordingSurface`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DrawCommand {
    Clear,
    StrokeRect {
        rect: BoundingBox,
        color: Color,
        line_width: f32,
    },
    FillRect {
        rect: BoundingBox,
        color: Color,
    },
    /// Viewport bounds of the hatched mask region.
    HatchMask {
        bounds: BoundingBox,
        color: Color,
        spacing: u32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        font_size: f32,
        color: Color,
    },
}

/// Approximate glyph advance as a fraction of the font size.
pub(crate) const APPROX_ADVANCE: f32 = 0.6;

/// Surface that keeps a command log instead of pixels.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.commands.clear();
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn stroke_rect(&mut self, rect: &BoundingBox, color: Color, line_width: f32) {
        self.commands.push(DrawCommand::StrokeRect {
            rect: *rect,
            color,
            line_width,
        });
    }

    fn fill_rect(&mut self, rect: &BoundingBox, color: Color) {
        self.commands.push(DrawCommand::FillRect { rect: *rect, color });
    }

    fn hatch_mask(
        &mut self,
        instance: &SegmentationInstance,
        fit: &FitRect,
        _threshold: u8,
        color: Color,
        spacing: u32,
    ) {
        self.commands.push(DrawCommand::HatchMask {
            bounds: fit.box_to_viewport(&instance.derived_box),
            color,
            spacing,
        });
    }

    fn measure_text(&self, text: &str, font_size: f32) -> (f32, f32) {
        (text.chars().count() as f32 * font_size * APPROX_ADVANCE, font_size)
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, font_size: f32, color: Color) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            font_size,
            color,
        });
    }
}
