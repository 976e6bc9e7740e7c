//! Pure geometry: boxes, contain/cover placement and client-to-source mapping.

mod bbox;
mod coords;
mod fit;

pub use bbox::BoundingBox;
pub use coords::{client_point_to_source, ClientRect};
pub use fit::{compute_contain_rect, compute_cover_rect, FitMode, FitRect};
