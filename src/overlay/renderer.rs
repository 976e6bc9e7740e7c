use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::labels::LabelCatalog;
use super::surface::{Color, Surface};
use crate::detect::Detection;
use crate::geometry::{BoundingBox, FitMode, FitRect};
use crate::reconcile::{match_detections_to_masks, MASK_MATCH_IOU_THRESHOLD};
use crate::segment::{SegmentationInstance, MASK_ALPHA_THRESHOLD};

/// Paint attempts made while the viewport has no size yet.
pub const DEFAULT_RETRY_LIMIT: u32 = 10;

const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_PADDING: f32 = 4.0;
const HATCH_SPACING: u32 = 6;

/// How one detection is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionStyle {
    pub stroke: Color,
    pub line_width: f32,
    pub hatch: Color,
    pub label_background: Color,
    pub label_text: Color,
}

impl DetectionStyle {
    pub fn selected() -> Self {
        Self {
            stroke: Color::rgb(255, 196, 0),
            line_width: 4.0,
            hatch: Color::rgba(255, 196, 0, 150),
            label_background: Color::rgba(255, 196, 0, 230),
            label_text: Color::rgb(0, 0, 0),
        }
    }
}

impl Default for DetectionStyle {
    fn default() -> Self {
        Self {
            stroke: Color::rgb(0, 200, 255),
            line_width: 2.0,
            hatch: Color::rgba(0, 200, 255, 110),
            label_background: Color::rgba(0, 0, 0, 180),
            label_text: Color::rgb(255, 255, 255),
        }
    }
}

/// Per-detection style override, called with the detection's index.
pub type StyleFn = Box<dyn Fn(usize, &Detection) -> DetectionStyle + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenderStatus {
    Drawn { detections: usize },
    /// Nothing to place yet: no source size known.
    NoSource,
    /// Viewport not laid out; retry on the next animation frame.
    Waiting { attempt: u32 },
    /// Retry budget spent with a zero viewport.
    GaveUp,
}

/// Keeps the overlay in sync with the latest detections and layout.
///
/// Every setter redraws synchronously. A zero-sized viewport schedules a
/// retry that `on_animation_frame` honours, up to the retry limit.
pub struct OverlayRenderer<S: Surface> {
    surface: S,
    labels: LabelCatalog,
    fit_mode: FitMode,
    source_size: Option<(u32, u32)>,
    viewport: (u32, u32),
    detections: Vec<Detection>,
    instances: Vec<SegmentationInstance>,
    matches: BTreeMap<usize, usize>,
    iou_threshold: f32,
    alpha_threshold: u8,
    retry_limit: u32,
    retries: u32,
    retry_pending: bool,
    style: Option<StyleFn>,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S, labels: LabelCatalog) -> Self {
        let viewport = surface.size();
        Self {
            surface,
            labels,
            fit_mode: FitMode::Contain,
            source_size: None,
            viewport,
            detections: Vec::new(),
            instances: Vec::new(),
            matches: BTreeMap::new(),
            iou_threshold: MASK_MATCH_IOU_THRESHOLD,
            alpha_threshold: MASK_ALPHA_THRESHOLD,
            retry_limit: DEFAULT_RETRY_LIMIT,
            retries: 0,
            retry_pending: false,
            style: None,
        }
    }

    pub fn with_fit_mode(mut self, mode: FitMode) -> Self {
        self.fit_mode = mode;
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    pub fn with_thresholds(mut self, iou_threshold: f32, alpha_threshold: u8) -> Self {
        self.iou_threshold = iou_threshold;
        self.alpha_threshold = alpha_threshold;
        self
    }

    pub fn set_style(&mut self, style: Option<StyleFn>) -> RenderStatus {
        self.style = style;
        self.render()
    }

    /// Highlight one detection with `DetectionStyle::selected`.
    pub fn highlight(&mut self, selected: Option<usize>) -> RenderStatus {
        let style: Option<StyleFn> = selected.map(|index| {
            Box::new(move |i: usize, _: &Detection| {
                if i == index {
                    DetectionStyle::selected()
                } else {
                    DetectionStyle::default()
                }
            }) as StyleFn
        });
        self.set_style(style)
    }

    pub fn set_source_size(&mut self, width: u32, height: u32) -> RenderStatus {
        self.source_size = (width > 0 && height > 0).then_some((width, height));
        self.render()
    }

    /// Resize observation from the layout.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> RenderStatus {
        self.viewport = (width, height);
        self.retries = 0;
        self.render()
    }

    /// Replace the drawn detections and masks; matching is recomputed.
    pub fn set_detections(
        &mut self,
        detections: Vec<Detection>,
        instances: Vec<SegmentationInstance>,
    ) -> RenderStatus {
        self.matches = match_detections_to_masks(&detections, &instances, self.iou_threshold);
        self.detections = detections;
        self.instances = instances;
        self.render()
    }

    pub fn clear_detections(&mut self) -> RenderStatus {
        self.set_detections(Vec::new(), Vec::new())
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn matches(&self) -> &BTreeMap<usize, usize> {
        &self.matches
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Next paint opportunity; only redraws when a retry is pending.
    pub fn on_animation_frame(&mut self) -> Option<RenderStatus> {
        if !self.retry_pending {
            return None;
        }
        Some(self.render())
    }

    pub fn render(&mut self) -> RenderStatus {
        let (vw, vh) = self.viewport;
        if vw == 0 || vh == 0 {
            if self.retries >= self.retry_limit {
                if self.retry_pending {
                    log::warn!(
                        "overlay viewport still zero-sized after {} attempts, giving up",
                        self.retries
                    );
                }
                self.retry_pending = false;
                return RenderStatus::GaveUp;
            }
            self.retries += 1;
            self.retry_pending = true;
            return RenderStatus::Waiting {
                attempt: self.retries,
            };
        }
        self.retries = 0;
        self.retry_pending = false;

        if self.surface.size() != (vw, vh) {
            self.surface.resize(vw, vh);
        }
        self.surface.clear();

        let Some((sw, sh)) = self.source_size else {
            return RenderStatus::NoSource;
        };
        let fit = FitRect::compute(self.fit_mode, vw as f32, vh as f32, sw as f32, sh as f32);

        for (index, detection) in self.detections.iter().enumerate() {
            let style = match &self.style {
                Some(style) => style(index, detection),
                None => DetectionStyle::default(),
            };
            let matched = self
                .matches
                .get(&index)
                .and_then(|&mask_index| self.instances.get(mask_index));
            let outline = match matched {
                Some(instance) => {
                    self.surface.hatch_mask(
                        instance,
                        &fit,
                        self.alpha_threshold,
                        style.hatch,
                        HATCH_SPACING,
                    );
                    fit.box_to_viewport(&instance.derived_box)
                }
                None => fit.box_to_viewport(&detection.bbox),
            };
            self.surface.stroke_rect(&outline, style.stroke, style.line_width);
            draw_label(&mut self.surface, &self.labels, detection, &outline, &style);
        }
        RenderStatus::Drawn {
            detections: self.detections.len(),
        }
    }
}

/// Label above the box, or just inside its top edge when there is no room.
fn draw_label<S: Surface>(
    surface: &mut S,
    labels: &LabelCatalog,
    detection: &Detection,
    outline: &BoundingBox,
    style: &DetectionStyle,
) {
    let text = labels.format_label(&detection.class_label, detection.confidence);
    let (text_w, text_h) = surface.measure_text(&text, LABEL_FONT_SIZE);
    let label_h = text_h + 2.0 * LABEL_PADDING;
    let label_w = text_w + 2.0 * LABEL_PADDING;
    let top = if outline.y - label_h >= 0.0 {
        outline.y - label_h
    } else {
        outline.y.max(0.0)
    };
    let left = outline.x.max(0.0);
    surface.fill_rect(
        &BoundingBox::new(left, top, label_w, label_h),
        style.label_background,
    );
    surface.fill_text(
        &text,
        left + LABEL_PADDING,
        top + LABEL_PADDING,
        LABEL_FONT_SIZE,
        style.label_text,
    );
}
