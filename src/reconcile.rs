//! Pairing of detection boxes with segmentation instances.

use std::collections::BTreeMap;

use crate::detect::Detection;
use crate::segment::SegmentationInstance;

/// A detection claims a mask only when their IoU exceeds this value.
pub const MASK_MATCH_IOU_THRESHOLD: f32 = 0.2;

/// Greedy best-IoU matching of detections to masks.
///
/// Detections are visited in input order; each one claims the unclaimed mask
/// with the highest IoU against its box when that IoU is strictly above
/// `iou_threshold`. The result maps detection index to mask index and no mask
/// index appears twice. Order dependent by construction.
pub fn match_detections_to_masks(
    detections: &[Detection],
    instances: &[SegmentationInstance],
    iou_threshold: f32,
) -> BTreeMap<usize, usize> {
    let mut claimed = vec![false; instances.len()];
    let mut matches = BTreeMap::new();

    for (det_index, detection) in detections.iter().enumerate() {
        let mut best: Option<(usize, f32)> = None;
        for (mask_index, instance) in instances.iter().enumerate() {
            if claimed[mask_index] {
                continue;
            }
            let iou = detection.bbox.iou(&instance.derived_box);
            if best.map_or(true, |(_, best_iou)| iou > best_iou) {
                best = Some((mask_index, iou));
            }
        }
        if let Some((mask_index, iou)) = best {
            if iou > iou_threshold {
                claimed[mask_index] = true;
                matches.insert(det_index, mask_index);
                log::trace!(
                    "detection {} ({}) matched mask {} at IoU {:.3}",
                    det_index,
                    detection.class_label,
                    mask_index,
                    iou
                );
            }
        }
    }
    matches
}
