use std::sync::{Arc, PoisonError};

use crate::detect::classes::PERSON_CLASS;
use crate::detect::{
    BackendRegistry, Capability, InstanceSegmenter, LazyModel, LoadState, SharedModel,
};
use crate::frame::Frame;

use super::mask::{hit_test_instances, MaskHit, SegmentationInstance, MASK_ALPHA_THRESHOLD};

/// Person instance segmentation adapter.
///
/// Gated per class: only classes in `segmentable_classes` (by default just
/// `"person"`) ever take the mask path. Errors never escape; they become an
/// empty instance list or no hit.
pub struct SegmenterService {
    registry: Arc<BackendRegistry>,
    model: LazyModel<dyn InstanceSegmenter>,
    segmentable_classes: Vec<String>,
    alpha_threshold: u8,
}

impl SegmenterService {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            model: LazyModel::new("person segmentation"),
            segmentable_classes: vec![PERSON_CLASS.to_string()],
            alpha_threshold: MASK_ALPHA_THRESHOLD,
        }
    }

    pub fn with_segmentable_classes(mut self, classes: Vec<String>) -> Self {
        self.segmentable_classes = classes;
        self
    }

    pub fn with_alpha_threshold(mut self, threshold: u8) -> Self {
        self.alpha_threshold = threshold;
        self
    }

    pub fn alpha_threshold(&self) -> u8 {
        self.alpha_threshold
    }

    pub fn state(&self) -> LoadState {
        self.model.state()
    }

    /// Capability probe with no side effects.
    pub fn is_available(&self) -> bool {
        match self.model.state() {
            LoadState::Ready => true,
            LoadState::Unavailable => false,
            LoadState::Unloaded | LoadState::Loading => {
                self.registry.supports(Capability::PersonSegmentation)
            }
        }
    }

    /// True when masks can be produced for detections of `label`.
    pub fn is_available_for_class(&self, label: &str) -> bool {
        self.segmentable_classes.iter().any(|c| c == label) && self.is_available()
    }

    pub fn is_segmentable(&self, label: &str) -> bool {
        self.segmentable_classes.iter().any(|c| c == label)
    }

    /// Load the segmenter if needed; shared by concurrent callers.
    pub fn load(&self) -> Option<SharedModel<dyn InstanceSegmenter>> {
        if let Some(model) = self.model.ready() {
            return Some(model);
        }
        let backend = self.registry.backend_for(Capability::PersonSegmentation)?;
        self.model.get_or_load(|| {
            log::info!("loading person segmenter from backend '{}'", backend.name());
            backend.load_segmenter()
        })
    }

    /// Segment every instance in the frame. Instances with an empty mask are dropped.
    pub fn segment_all(&self, frame: &Frame) -> Vec<SegmentationInstance> {
        let Some(model) = self.load() else {
            return Vec::new();
        };
        let raw_masks = {
            let mut segmenter = model.lock().unwrap_or_else(PoisonError::into_inner);
            match segmenter.segment(frame) {
                Ok(masks) => masks,
                Err(e) => {
                    log::warn!("segmentation failed for this frame: {:#}", e);
                    return Vec::new();
                }
            }
        };

        let (width, height) = frame.size();
        let mut instances = Vec::with_capacity(raw_masks.len());
        for (index, raw) in raw_masks.iter().enumerate() {
            match SegmentationInstance::from_raw(raw, width, height, self.alpha_threshold) {
                Ok(Some(instance)) => instances.push(instance),
                Ok(None) => log::debug!("dropping empty mask {}", index),
                Err(e) => log::warn!("dropping malformed mask {}: {:#}", index, e),
            }
        }
        log::debug!(
            "segmented {} instances ({} raw) in {}x{} frame",
            instances.len(),
            raw_masks.len(),
            width,
            height
        );
        instances
    }

    /// Segment the frame and return the first instance covering `(px, py)`.
    pub fn hit_test(&self, frame: &Frame, px: f32, py: f32) -> Option<MaskHit> {
        let instances = self.segment_all(frame);
        hit_test_instances(&instances, px, py, self.alpha_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::geometry::BoundingBox;
    use crate::segment::RawMask;

    fn service(backend: StubBackend) -> SegmenterService {
        SegmenterService::new(Arc::new(BackendRegistry::new().with(backend)))
    }

    fn frame() -> Frame {
        Frame::solid(40, 40, [0, 0, 0, 255])
    }

    #[test]
    fn only_person_class_is_segmentable() {
        let svc = service(StubBackend::new().with_masks(Vec::new()));
        assert!(svc.is_available_for_class("person"));
        assert!(!svc.is_available_for_class("cup"));
    }

    #[test]
    fn availability_probe_is_idempotent() {
        let svc = service(StubBackend::new().with_masks(Vec::new()));
        let first = svc.is_available_for_class("person");
        for _ in 0..5 {
            assert_eq!(svc.is_available_for_class("person"), first);
        }
        let absent = service(StubBackend::new());
        for _ in 0..5 {
            assert!(!absent.is_available_for_class("person"));
        }
    }

    #[test]
    fn segment_all_drops_empty_masks() {
        let svc = service(StubBackend::new().with_masks(vec![
            RawMask::rectangle(40, 40, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            RawMask::rectangle(40, 40, BoundingBox::new(0.0, 0.0, 0.0, 0.0)),
            RawMask::rectangle(20, 20, BoundingBox::new(10.0, 10.0, 10.0, 10.0)),
        ]));
        let instances = svc.segment_all(&frame());
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].derived_box, BoundingBox::new(20.0, 20.0, 20.0, 20.0));
    }

    #[test]
    fn hit_test_reports_instance_box() {
        let svc = service(StubBackend::new().with_masks(vec![RawMask::rectangle(
            40,
            40,
            BoundingBox::new(5.0, 5.0, 10.0, 20.0),
        )]));
        let hit = svc.hit_test(&frame(), 8.0, 20.0).unwrap();
        assert_eq!(hit.instance_index, 0);
        assert_eq!(hit.bbox, BoundingBox::new(5.0, 5.0, 10.0, 20.0));
        assert!(svc.hit_test(&frame(), 30.0, 30.0).is_none());
    }

    #[test]
    fn failures_are_soft() {
        let backend = StubBackend::new().with_masks(vec![RawMask::rectangle(
            40,
            40,
            BoundingBox::new(0.0, 0.0, 40.0, 40.0),
        )]);
        let failures = backend.call_failures();
        let svc = service(backend);
        failures.set(true);
        assert!(svc.segment_all(&frame()).is_empty());
        assert!(svc.hit_test(&frame(), 1.0, 1.0).is_none());
        failures.set(false);
        assert!(svc.hit_test(&frame(), 1.0, 1.0).is_some());

        let broken = service(StubBackend::new().with_masks(Vec::new()).failing_load());
        assert!(broken.segment_all(&frame()).is_empty());
        assert!(!broken.is_available_for_class("person"));
    }
}
