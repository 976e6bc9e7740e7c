mod backend;
pub mod backends;
pub mod classes;
mod detector;
mod lazy;
mod registry;
mod result;

pub use backend::{Capability, FeatureEmbedder, InstanceSegmenter, ModelBackend, ObjectDetector};
pub use backends::{StubBackend, StubSwitch};
pub use detector::{ObjectDetectorService, INITIAL_SCORE_THRESHOLD, LIVE_SCORE_THRESHOLD};
pub use lazy::{LazyModel, LoadState, SharedModel};
pub use registry::BackendRegistry;
pub use result::{filter_by_score, Detection};
