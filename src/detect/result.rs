use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// One detected object in source-image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_label: String,
    pub bbox: BoundingBox,
    #[serde(rename = "score")]
    pub confidence: f32,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            class_label: class_label.into(),
            bbox,
            confidence,
        }
    }

    pub fn is_class(&self, label: &str) -> bool {
        self.class_label == label
    }
}

/// Keep detections at or above `threshold`. `None` keeps everything.
pub fn filter_by_score(detections: Vec<Detection>, threshold: Option<f32>) -> Vec<Detection> {
    match threshold {
        Some(threshold) => detections
            .into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= threshold)
            .collect(),
        None => detections,
    }
}
