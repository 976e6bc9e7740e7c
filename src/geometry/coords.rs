//! Client (screen) space to source-image space conversion.

use serde::{Deserialize, Serialize};

use super::FitRect;

/// Bounding rectangle of a displayed surface in client coordinates,
/// as reported by the UI layer for the element that received the tap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ClientRect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Client rectangle of the scaled image when this rect is the viewport
    /// laid out with `fit`. In cover mode the result extends past the viewport.
    pub fn displayed_image(&self, fit: &FitRect) -> ClientRect {
        let bounds = fit.display_bounds();
        ClientRect::new(
            self.left + bounds.x,
            self.top + bounds.y,
            bounds.width,
            bounds.height,
        )
    }
}

/// Map a client point into source pixels, given the client rect the whole
/// source image is stretched over.
///
/// A zero-sized rect yields `(0, 0)`; callers treat that as "no hit".
pub fn client_point_to_source(
    rect: &ClientRect,
    source_width: f32,
    source_height: f32,
    client_x: f32,
    client_y: f32,
) -> (f32, f32) {
    if rect.is_degenerate() {
        return (0.0, 0.0);
    }
    let scale_x = source_width / rect.width;
    let scale_y = source_height / rect.height;
    (
        (client_x - rect.left) * scale_x,
        (client_y - rect.top) * scale_y,
    )
}
