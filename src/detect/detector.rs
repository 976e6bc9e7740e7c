use std::sync::{Arc, PoisonError};

use super::backend::{Capability, ObjectDetector};
use super::lazy::{LazyModel, LoadState, SharedModel};
use super::registry::BackendRegistry;
use super::result::{filter_by_score, Detection};
use crate::frame::Frame;

/// Score cutoff used when a photo is first analysed.
pub const INITIAL_SCORE_THRESHOLD: f32 = 0.3;
/// Score cutoff used for live preview and tap-to-find.
pub const LIVE_SCORE_THRESHOLD: f32 = 0.5;

/// Object detection adapter.
///
/// Wraps whichever registered backend provides `Capability::ObjectDetection`,
/// loads it at most once per session, and never surfaces errors: a missing
/// capability, a failed load or a failed call all produce an empty list.
pub struct ObjectDetectorService {
    registry: Arc<BackendRegistry>,
    model: LazyModel<dyn ObjectDetector>,
}

impl ObjectDetectorService {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            model: LazyModel::new("object detection"),
        }
    }

    /// Capability probe with no side effects.
    pub fn is_available(&self) -> bool {
        match self.model.state() {
            LoadState::Ready => true,
            LoadState::Unavailable => false,
            LoadState::Unloaded | LoadState::Loading => {
                self.registry.supports(Capability::ObjectDetection)
            }
        }
    }

    pub fn state(&self) -> LoadState {
        self.model.state()
    }

    /// Load the detector if needed. Concurrent callers share one load and
    /// all observe the same outcome.
    ///
    /// While the capability is absent nothing is attempted and the adapter
    /// stays unloaded, so a later call can still succeed.
    pub fn load(&self) -> Option<SharedModel<dyn ObjectDetector>> {
        if let Some(model) = self.model.ready() {
            return Some(model);
        }
        let backend = self.registry.backend_for(Capability::ObjectDetection)?;
        self.model.get_or_load(|| {
            log::info!("loading object detector from backend '{}'", backend.name());
            backend.load_detector()
        })
    }

    /// Run detection and drop results under `score_threshold`.
    pub fn detect(&self, frame: &Frame, score_threshold: Option<f32>) -> Vec<Detection> {
        let Some(model) = self.load() else {
            log::debug!("object detection unavailable, returning no detections");
            return Vec::new();
        };
        let mut detector = model.lock().unwrap_or_else(PoisonError::into_inner);
        match detector.detect(frame) {
            Ok(detections) => {
                let total = detections.len();
                let kept = filter_by_score(detections, score_threshold);
                log::debug!(
                    "detected {} objects ({} above threshold {:?}) in {}x{} frame",
                    total,
                    kept.len(),
                    score_threshold,
                    frame.width(),
                    frame.height()
                );
                kept
            }
            Err(e) => {
                log::warn!("object detection failed for this frame: {:#}", e);
                Vec::new()
            }
        }
    }
}
