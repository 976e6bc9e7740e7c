#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgba, RgbaImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{Capability, ModelBackend, ObjectDetector};
use crate::detect::classes::COCO_CLASSES;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::geometry::{compute_contain_rect, BoundingBox, FitRect};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

const DEFAULT_INPUT_SIZE: u32 = 640;
const LETTERBOX_FILL: u8 = 114;

/// Tract-based object detection from a local YOLO-style ONNX export.
///
/// The capability is reported present once the model file exists, so a model
/// dropped in after start-up is picked up on the next probe. Expected output
/// rows are `x1, y1, x2, y2, score, class` in letterboxed input pixels.
pub struct TractBackend {
    model_path: PathBuf,
    input_size: u32,
    labels: Vec<String>,
}

impl TractBackend {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            input_size: DEFAULT_INPUT_SIZE,
            labels: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the square model input size.
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size.max(1);
        self
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: Capability) -> bool {
        matches!(capability, Capability::ObjectDetection) && self.model_path.is_file()
    }

    fn load_detector(&self) -> Result<Box<dyn ObjectDetector>> {
        let size = self.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!("failed to load ONNX model from {}", self.model_path.display())
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Box::new(TractDetector {
            model,
            input_size: self.input_size,
            labels: self.labels.clone(),
        }))
    }
}

struct TractDetector {
    model: Plan,
    input_size: u32,
    labels: Vec<String>,
}

impl TractDetector {
    fn build_input(&self, frame: &Frame) -> Result<(Tensor, FitRect)> {
        let (src_w, src_h) = frame.size();
        if src_w == 0 || src_h == 0 {
            return Err(anyhow!("cannot run detection on an empty frame"));
        }
        let size = self.input_size;
        let letterbox = compute_contain_rect(size as f32, size as f32, src_w as f32, src_h as f32);
        let (display_w, display_h) = letterbox.display_size();
        let new_w = (display_w.round() as u32).clamp(1, size);
        let new_h = (display_h.round() as u32).clamp(1, size);

        let resized = imageops::resize(frame.image(), new_w, new_h, imageops::FilterType::Triangle);
        let mut canvas = RgbaImage::from_pixel(
            size,
            size,
            Rgba([LETTERBOX_FILL, LETTERBOX_FILL, LETTERBOX_FILL, 255]),
        );
        let (pad_x, pad_y) = letterbox.screen_offset();
        imageops::overlay(&mut canvas, &resized, pad_x.round() as i64, pad_y.round() as i64);

        let side = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            canvas.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
        });
        Ok((input.into_tensor(), letterbox))
    }

    fn parse_rows(
        &self,
        outputs: TVec<TValue>,
        letterbox: &FitRect,
        frame: &Frame,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let shape = output.shape().to_vec();
        let (rows, stride) = match shape.as_slice() {
            [n, stride] => (*n, *stride),
            [1, n, stride] => (*n, *stride),
            other => return Err(anyhow!("unsupported detection output shape {:?}", other)),
        };
        if stride < 6 {
            return Err(anyhow!("detection rows need 6 columns, got {}", stride));
        }
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let data: Vec<f32> = view.iter().copied().collect();

        let (src_w, src_h) = (frame.width() as f32, frame.height() as f32);
        let mut detections = Vec::new();
        for row in data.chunks_exact(stride).take(rows) {
            let score = row[4];
            if !score.is_finite() || score <= 0.0 {
                continue;
            }
            let class_id = row[5] as i64;
            let Some(label) = usize::try_from(class_id)
                .ok()
                .and_then(|id| self.labels.get(id))
            else {
                log::debug!("skipping detection with unknown class id {}", class_id);
                continue;
            };
            let (Some((x1, y1)), Some((x2, y2))) = (
                letterbox.viewport_to_source(row[0], row[1]),
                letterbox.viewport_to_source(row[2], row[3]),
            ) else {
                continue;
            };
            let bbox = BoundingBox::from_corners(x1, y1, x2, y2).clamp_to(src_w, src_h);
            if bbox.is_empty() {
                continue;
            }
            detections.push(Detection::new(label.clone(), bbox, score.min(1.0)));
        }
        Ok(detections)
    }
}

impl ObjectDetector for TractDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, letterbox) = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.parse_rows(outputs, &letterbox, frame)
    }
}
