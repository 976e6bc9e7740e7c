use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::segment::RawMask;

/// Capabilities a model backend may provide.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Class-labelled boxes for arbitrary objects.
    ObjectDetection,
    /// Per-instance pixel masks for people.
    PersonSegmentation,
    /// Fixed-length visual descriptor of an image crop.
    FeatureEmbedding,
}

/// Provider of heavy model capabilities.
///
/// `supports` is a pure probe and may change from false to true over the
/// lifetime of a session (a model file appearing, a deferred runtime coming
/// up). Callers re-check it before every attempt. The `load_*` hooks are the
/// expensive one-time initialisers; the pipeline calls each at most once per
/// session.
pub trait ModelBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend can currently provide `capability`.
    fn supports(&self, capability: Capability) -> bool;

    fn load_detector(&self) -> Result<Box<dyn ObjectDetector>> {
        Err(anyhow!("backend '{}' does not provide object detection", self.name()))
    }

    fn load_segmenter(&self) -> Result<Box<dyn InstanceSegmenter>> {
        Err(anyhow!("backend '{}' does not provide segmentation", self.name()))
    }

    fn load_embedder(&self) -> Result<Box<dyn FeatureEmbedder>> {
        Err(anyhow!("backend '{}' does not provide embeddings", self.name()))
    }
}

/// A loaded object detector.
///
/// Boxes are returned in source-image pixels of the given frame; threshold
/// filtering happens in the adapter, not here.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// A loaded person instance segmenter. One raw mask per instance, in any
/// order and any of the supported encodings.
pub trait InstanceSegmenter: Send {
    fn segment(&mut self, frame: &Frame) -> Result<Vec<RawMask>>;
}

/// A loaded embedding model.
pub trait FeatureEmbedder: Send {
    /// Identifier recorded on produced vectors so incomparable ones are never mixed.
    fn model_id(&self) -> &str;

    fn embed(&mut self, crop: &RgbaImage) -> Result<Vec<f32>>;
}
