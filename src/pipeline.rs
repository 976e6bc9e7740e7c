//! The three call sites of the detection core: live preview, captured-photo
//! review and gameplay tap-to-find.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::detect::{BackendRegistry, Detection, ObjectDetectorService};
use crate::embedding::{Disambiguator, Verdict};
use crate::frame::Frame;
use crate::hit_test::{ClientTap, HitTestResolver};
use crate::overlay::{OverlayRenderer, Surface};
use crate::reconcile::match_detections_to_masks;
use crate::segment::{SegmentationInstance, SegmenterService};
use crate::treasure::Treasure;

/// One frame's detections, masks and their pairing.
#[derive(Clone, Debug, Default)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    pub instances: Vec<SegmentationInstance>,
    /// Detection index to instance index.
    pub matches: BTreeMap<usize, usize>,
    pub source_width: u32,
    pub source_height: u32,
}

/// Result of the editor's "tap the treasure on the photo" step.
#[derive(Clone, Debug)]
pub struct CaptureReview {
    pub selection: Detection,
    pub treasure: Treasure,
}

/// Gameplay outcome of a tap on the live camera view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum FindOutcome {
    /// Right class, and the same instance when a reference embedding exists.
    /// `similarity` is `None` when no embedding check ran.
    Found {
        detection: Detection,
        similarity: Option<f32>,
    },
    NothingThere,
    ClassMismatch { found: Detection },
    /// Right class, but the embedding says it is a different object.
    DifferentInstance {
        detection: Detection,
        similarity: f32,
    },
}

impl FindOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, FindOutcome::Found { .. })
    }
}

/// Detection core with its adapters shared across call sites.
pub struct SelectionPipeline {
    config: PipelineConfig,
    detector: Arc<ObjectDetectorService>,
    segmenter: Arc<SegmenterService>,
    resolver: HitTestResolver,
    disambiguator: Arc<Disambiguator>,
}

impl SelectionPipeline {
    pub fn new(registry: Arc<BackendRegistry>, config: PipelineConfig) -> Self {
        let detector = Arc::new(ObjectDetectorService::new(registry.clone()));
        let segmenter = Arc::new(
            SegmenterService::new(registry.clone())
                .with_segmentable_classes(config.segmentation.segmentable_classes.clone())
                .with_alpha_threshold(config.segmentation.mask_alpha_threshold),
        );
        let disambiguator = Arc::new(
            Disambiguator::new(registry)
                .with_threshold(config.embedding.similarity_threshold)
                .with_fingerprint_size(config.embedding.fingerprint_size),
        );
        Self {
            resolver: HitTestResolver::new(segmenter.clone()),
            config,
            detector,
            segmenter,
            disambiguator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector(&self) -> &Arc<ObjectDetectorService> {
        &self.detector
    }

    pub fn segmenter(&self) -> &Arc<SegmenterService> {
        &self.segmenter
    }

    pub fn disambiguator(&self) -> &Arc<Disambiguator> {
        &self.disambiguator
    }

    pub fn resolver(&self) -> &HitTestResolver {
        &self.resolver
    }

    /// Detect, segment when a segmentable class is present, and pair them.
    pub fn analyze(&self, frame: &Frame, score_threshold: Option<f32>) -> FrameAnalysis {
        let detections = self.detector.detect(frame, score_threshold);
        let wants_masks = detections
            .iter()
            .any(|d| self.segmenter.is_available_for_class(&d.class_label));
        let instances = if wants_masks {
            self.segmenter.segment_all(frame)
        } else {
            Vec::new()
        };
        let matches = match_detections_to_masks(
            &detections,
            &instances,
            self.config.segmentation.mask_iou_threshold,
        );
        FrameAnalysis {
            detections,
            instances,
            matches,
            source_width: frame.width(),
            source_height: frame.height(),
        }
    }

    /// First analysis of a captured photo.
    pub fn initial_detections(&self, frame: &Frame) -> FrameAnalysis {
        self.analyze(frame, Some(self.config.detection.initial_score_threshold))
    }

    /// Per-frame analysis for live preview.
    pub fn live_detections(&self, frame: &Frame) -> FrameAnalysis {
        self.analyze(frame, Some(self.config.detection.live_score_threshold))
    }

    /// Editor flow: the parent taps an object on a captured photo.
    ///
    /// The tap is first resolved against boxes; when the hit class can be
    /// segmented it is resolved again against masks for a tighter box. The
    /// returned treasure carries the selection's class, the analysis snapshot
    /// and, when it can be computed, a reference embedding.
    pub fn review_capture(
        &self,
        frame: &Frame,
        analysis: &FrameAnalysis,
        tap: &ClientTap,
    ) -> Option<CaptureReview> {
        let (sw, sh) = (analysis.source_width, analysis.source_height);
        let coarse = self
            .resolver
            .resolve_tap(frame, tap, sw, sh, &analysis.detections, None)?;
        let selection = if self.segmenter.is_segmentable(&coarse.class_label) {
            self.resolver
                .resolve_tap(
                    frame,
                    tap,
                    sw,
                    sh,
                    &analysis.detections,
                    Some(&coarse.class_label),
                )
                .unwrap_or(coarse)
        } else {
            coarse
        };

        let mut treasure = Treasure::new(selection.class_label.clone());
        treasure.snapshot_detections(&analysis.detections, &analysis.instances, sw, sh);
        treasure.feature_embedding = self.disambiguator.embed_region(frame, &selection.bbox);
        log::info!(
            "selected {} at {:?} (embedding: {})",
            selection.class_label,
            <[f32; 4]>::from(selection.bbox),
            treasure.feature_embedding.is_some()
        );
        Some(CaptureReview {
            selection,
            treasure,
        })
    }

    /// Gameplay flow: does the tap land on this treasure?
    ///
    /// A failed embedding check never blocks the player: the class match
    /// alone is accepted.
    pub fn find_treasure(
        &self,
        frame: &Frame,
        tap: &ClientTap,
        treasure: &Treasure,
    ) -> FindOutcome {
        let target = treasure.detected_object_class.as_str();
        let detections = self
            .detector
            .detect(frame, Some(self.config.detection.live_score_threshold));
        let Some(detection) = self.resolver.resolve_tap(
            frame,
            tap,
            frame.width(),
            frame.height(),
            &detections,
            Some(target),
        ) else {
            return FindOutcome::NothingThere;
        };
        if !detection.is_class(target) {
            log::debug!("tapped {} while looking for {}", detection.class_label, target);
            return FindOutcome::ClassMismatch { found: detection };
        }
        let Some(reference) = treasure.reference_embedding() else {
            return FindOutcome::Found {
                detection,
                similarity: None,
            };
        };
        match self.disambiguator.verify(reference, frame, &detection.bbox) {
            Verdict::Accepted { similarity } => FindOutcome::Found {
                detection,
                similarity: Some(similarity),
            },
            Verdict::Rejected { similarity } => FindOutcome::DifferentInstance {
                detection,
                similarity,
            },
            Verdict::Skipped { .. } => FindOutcome::Found {
                detection,
                similarity: None,
            },
        }
    }

    /// Overlay renderer configured from this pipeline's settings.
    pub fn overlay_renderer<S: Surface>(&self, surface: S) -> Result<OverlayRenderer<S>> {
        Ok(OverlayRenderer::new(surface, self.config.label_catalog()?)
            .with_fit_mode(self.config.overlay.fit_mode)
            .with_retry_limit(self.config.overlay.retry_limit)
            .with_thresholds(
                self.config.segmentation.mask_iou_threshold,
                self.config.segmentation.mask_alpha_threshold,
            ))
    }
}
