//! Treasure Lens
//!
//! Detection-to-selection core for a camera treasure hunt: a player points a
//! camera at real objects and taps the one they think is the treasure.
//!
//! # Pipeline
//!
//! 1. **Fit**: place the source image in the viewport (contain or cover).
//! 2. **Map**: convert a client tap into source pixels.
//! 3. **Detect**: boxes with class and score from an injected backend.
//! 4. **Segment**: per-person alpha masks with derived boxes.
//! 5. **Reconcile**: greedy IoU pairing of boxes with masks.
//! 6. **Hit-test**: mask first for segmentable classes, else smallest box.
//! 7. **Disambiguate**: embedding similarity between two instances of a class.
//! 8. **Overlay**: boxes, hatched masks and labels on a drawing surface.
//!
//! Model access goes through `detect::BackendRegistry`; nothing in the
//! pipeline returns an error to its caller. Missing or failing models
//! degrade to empty results and a log line.
//!
//! # Module Structure
//!
//! - `geometry`: boxes, fit rectangles, client-to-source mapping
//! - `frame`: owned RGBA frames and crops
//! - `detect`: backends, lazy model cells, the object detector adapter
//! - `segment`: masks and the person segmenter adapter
//! - `reconcile`, `hit_test`, `embedding`, `overlay`: selection stages
//! - `pipeline`, `live`, `treasure`: call sites and the game boundary

pub mod config;
pub mod detect;
pub mod embedding;
pub mod frame;
pub mod geometry;
pub mod hit_test;
pub mod live;
pub mod overlay;
pub mod pipeline;
pub mod reconcile;
pub mod segment;
pub mod treasure;

pub use config::PipelineConfig;
pub use detect::{BackendRegistry, Capability, Detection, ModelBackend, StubBackend};
pub use embedding::{cosine_similarity, EmbeddingVector, FEATURE_SIMILARITY_THRESHOLD};
pub use frame::Frame;
pub use geometry::{
    client_point_to_source, compute_contain_rect, compute_cover_rect, BoundingBox, ClientRect,
    FitMode, FitRect,
};
pub use hit_test::{ClientTap, HitTestResolver};
pub use pipeline::{CaptureReview, FindOutcome, FrameAnalysis, SelectionPipeline};
pub use reconcile::{match_detections_to_masks, MASK_MATCH_IOU_THRESHOLD};
pub use segment::{SegmentationInstance, SegmenterService};
pub use treasure::Treasure;
