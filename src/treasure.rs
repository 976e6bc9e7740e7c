//! Treasure record fields the selection core reads and writes.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::embedding::EmbeddingVector;
use crate::geometry::BoundingBox;
use crate::segment::SegmentationInstance;

/// The slice of a treasure that belongs to the detection boundary. The
/// surrounding game owns everything else (riddles, hints, ordering).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Treasure {
    pub detected_object_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_embedding: Option<EmbeddingVector>,
    /// Detections from the last edit session.
    #[serde(default)]
    pub predictions: Vec<Detection>,
    /// Derived boxes of the person masks from the last edit session.
    #[serde(default)]
    pub segment_masks: Vec<BoundingBox>,
    #[serde(default)]
    pub source_width: u32,
    #[serde(default)]
    pub source_height: u32,
}

impl Treasure {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            detected_object_class: class.into(),
            ..Self::default()
        }
    }

    /// Cache an edit session's analysis. Replaces any previous snapshot.
    pub fn snapshot_detections(
        &mut self,
        detections: &[Detection],
        instances: &[SegmentationInstance],
        source_width: u32,
        source_height: u32,
    ) {
        self.predictions = detections.to_vec();
        self.segment_masks = instances.iter().map(|i| i.derived_box).collect();
        self.source_width = source_width;
        self.source_height = source_height;
    }

    /// The stored embedding, when there is a non-empty one to verify against.
    pub fn reference_embedding(&self) -> Option<&EmbeddingVector> {
        self.feature_embedding.as_ref().filter(|e| !e.is_empty())
    }

    pub fn has_reference_embedding(&self) -> bool {
        self.reference_embedding().is_some()
    }
}
