//! Debug overlay: boxes, hatched person masks and labels drawn over the
//! displayed image.

mod labels;
mod raster;
mod renderer;
mod surface;

pub use labels::LabelCatalog;
pub use raster::RasterSurface;
pub use renderer::{
    DetectionStyle, OverlayRenderer, RenderStatus, StyleFn, DEFAULT_RETRY_LIMIT,
};
pub use surface::{Color, DrawCommand, RecordingSurface, Surface};
