//! Tap resolution: client point to a single detection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::frame::Frame;
use crate::geometry::{client_point_to_source, ClientRect};
use crate::segment::SegmenterService;

/// Confidence reported for a detection synthesised from a mask hit.
pub const MASK_HIT_CONFIDENCE: f32 = 1.0;

/// A tap in client coordinates plus the client rect the source image is
/// displayed over.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientTap {
    pub view_rect: ClientRect,
    pub client_x: f32,
    pub client_y: f32,
}

impl ClientTap {
    pub fn new(view_rect: ClientRect, client_x: f32, client_y: f32) -> Self {
        Self {
            view_rect,
            client_x,
            client_y,
        }
    }

    /// Source-pixel position of the tap. `None` when the view rect has no area.
    pub fn to_source(&self, source_width: u32, source_height: u32) -> Option<(f32, f32)> {
        if self.view_rect.is_degenerate() {
            return None;
        }
        Some(client_point_to_source(
            &self.view_rect,
            source_width as f32,
            source_height as f32,
            self.client_x,
            self.client_y,
        ))
    }
}

/// Two-tier tap resolver: pixel-accurate mask test for segmentable target
/// classes, smallest enclosing box otherwise.
pub struct HitTestResolver {
    segmenter: Arc<SegmenterService>,
}

impl HitTestResolver {
    pub fn new(segmenter: Arc<SegmenterService>) -> Self {
        Self { segmenter }
    }

    pub fn resolve_tap(
        &self,
        frame: &Frame,
        tap: &ClientTap,
        source_width: u32,
        source_height: u32,
        detections: &[Detection],
        target_class: Option<&str>,
    ) -> Option<Detection> {
        let Some((px, py)) = tap.to_source(source_width, source_height) else {
            log::debug!("tap on a zero-sized view rect, treating as no hit");
            return None;
        };
        self.resolve_source_point(frame, px, py, detections, target_class)
    }

    /// Same as `resolve_tap` with the point already in source pixels.
    pub fn resolve_source_point(
        &self,
        frame: &Frame,
        px: f32,
        py: f32,
        detections: &[Detection],
        target_class: Option<&str>,
    ) -> Option<Detection> {
        if let Some(class) = target_class {
            if self.segmenter.is_available_for_class(class) {
                if let Some(hit) = self.segmenter.hit_test(frame, px, py) {
                    log::debug!(
                        "mask hit on instance {} at ({:.1}, {:.1})",
                        hit.instance_index,
                        px,
                        py
                    );
                    return Some(Detection::new(class, hit.bbox, MASK_HIT_CONFIDENCE));
                }
            }
        }
        smallest_box_at(detections, px, py).cloned()
    }
}

/// Detection with the smallest box containing `(px, py)`; the earlier one on
/// equal area.
pub fn smallest_box_at(detections: &[Detection], px: f32, py: f32) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for detection in detections.iter().filter(|d| d.bbox.contains(px, py)) {
        match best {
            Some(current) if current.bbox.area() <= detection.bbox.area() => {}
            _ => best = Some(detection),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BackendRegistry, StubBackend};
    use crate::geometry::BoundingBox;
    use crate::segment::RawMask;

    fn resolver(backend: StubBackend) -> HitTestResolver {
        let registry = Arc::new(BackendRegistry::new().with(backend));
        HitTestResolver::new(Arc::new(SegmenterService::new(registry)))
    }

    fn identity_tap(x: f32, y: f32, size: f32) -> ClientTap {
        ClientTap::new(ClientRect::new(0.0, 0.0, size, size), x, y)
    }

    #[test]
    fn smaller_nested_box_wins() {
        let detections = vec![
            Detection::new("person", BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.9),
            Detection::new("cell phone", BoundingBox::new(10.0, 10.0, 20.0, 20.0), 0.6),
        ];
        let hit = smallest_box_at(&detections, 15.0, 15.0).unwrap();
        assert_eq!(hit.class_label, "cell phone");
        let hit = smallest_box_at(&detections, 50.0, 50.0).unwrap();
        assert_eq!(hit.class_label, "person");
    }

    #[test]
    fn box_only_cup_scenario() {
        let r = resolver(StubBackend::new());
        let frame = Frame::solid(640, 640, [0, 0, 0, 255]);
        let detections = vec![Detection::new("cup", BoundingBox::new(50.0, 50.0, 40.0, 40.0), 0.8)];
        let tap = identity_tap(60.0, 60.0, 640.0);
        let found = r.resolve_tap(&frame, &tap, 640, 640, &detections, Some("cup"));
        assert_eq!(found.map(|d| d.class_label), Some("cup".to_string()));
        let tap = identity_tap(500.0, 500.0, 640.0);
        let missed = r.resolve_tap(&frame, &tap, 640, 640, &detections, Some("cup"));
        assert!(missed.is_none());
    }

    #[test]
    fn tap_is_scaled_into_source_space() {
        let r = resolver(StubBackend::new());
        let frame = Frame::solid(400, 400, [0, 0, 0, 255]);
        let detections = vec![Detection::new(
            "cup",
            BoundingBox::new(100.0, 100.0, 40.0, 40.0),
            0.8,
        )];
        // 200px view over a 400px source: client (60, 60) is source (120, 120).
        let tap = ClientTap::new(ClientRect::new(0.0, 0.0, 200.0, 200.0), 60.0, 60.0);
        assert!(r.resolve_tap(&frame, &tap, 400, 400, &detections, None).is_some());
    }

    #[test]
    fn mask_hit_beats_other_boxes() {
        let mask = RawMask::rectangle(100, 100, BoundingBox::new(20.0, 10.0, 30.0, 80.0));
        let r = resolver(StubBackend::new().with_masks(vec![mask]));
        let frame = Frame::solid(100, 100, [0, 0, 0, 255]);
        let detections = vec![
            Detection::new("chair", BoundingBox::new(25.0, 40.0, 10.0, 10.0), 0.7),
            Detection::new("person", BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.9),
        ];
        let tap = identity_tap(30.0, 45.0, 100.0);
        let found = r
            .resolve_tap(&frame, &tap, 100, 100, &detections, Some("person"))
            .unwrap();
        assert_eq!(found.class_label, "person");
        assert_eq!(found.bbox, BoundingBox::new(20.0, 10.0, 30.0, 80.0));
        assert_eq!(found.confidence, MASK_HIT_CONFIDENCE);
    }

    #[test]
    fn mask_miss_falls_back_to_boxes() {
        let mask = RawMask::rectangle(100, 100, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let r = resolver(StubBackend::new().with_masks(vec![mask]));
        let frame = Frame::solid(100, 100, [0, 0, 0, 255]);
        let detections = vec![Detection::new(
            "person",
            BoundingBox::new(50.0, 50.0, 40.0, 40.0),
            0.9,
        )];
        let tap = identity_tap(60.0, 60.0, 100.0);
        let found = r
            .resolve_tap(&frame, &tap, 100, 100, &detections, Some("person"))
            .unwrap();
        assert_eq!(found.bbox, BoundingBox::new(50.0, 50.0, 40.0, 40.0));
    }

    #[test]
    fn non_person_target_never_uses_masks() {
        let mask = RawMask::rectangle(100, 100, BoundingBox::new(0.0, 0.0, 100.0, 100.0));
        let r = resolver(StubBackend::new().with_masks(vec![mask]));
        let frame = Frame::solid(100, 100, [0, 0, 0, 255]);
        let tap = identity_tap(5.0, 5.0, 100.0);
        let found = r.resolve_tap(&frame, &tap, 100, 100, &[], Some("cup"));
        assert!(found.is_none());
    }

    #[test]
    fn degenerate_view_rect_is_no_hit() {
        let r = resolver(StubBackend::new());
        let frame = Frame::solid(100, 100, [0, 0, 0, 255]);
        let detections = vec![Detection::new("cup", BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.8)];
        let tap = ClientTap::new(ClientRect::new(0.0, 0.0, 0.0, 0.0), 0.0, 0.0);
        assert!(r.resolve_tap(&frame, &tap, 100, 100, &detections, None).is_none());
    }
}
