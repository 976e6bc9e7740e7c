use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::{imageops, RgbaImage};

use crate::detect::backend::{
    Capability, FeatureEmbedder, InstanceSegmenter, ModelBackend, ObjectDetector,
};
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::segment::RawMask;

/// Shared on/off switch for flipping stub behaviour from a test.
#[derive(Clone, Debug, Default)]
pub struct StubSwitch(Arc<AtomicBool>);

impl StubSwitch {
    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scripted backend for tests and demos.
///
/// Each capability is provided only when configured: `with_detections` for
/// boxes, `with_masks` for person segmentation, `with_embedder` for feature
/// vectors. The loaded models ignore pixel content for boxes and masks and
/// return the scripted values every call.
pub struct StubBackend {
    name: &'static str,
    present: StubSwitch,
    fail_calls: StubSwitch,
    fail_load: bool,
    detections: Option<Vec<Detection>>,
    masks: Option<Vec<RawMask>>,
    embedder: bool,
    loads: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::named("stub")
    }

    pub fn named(name: &'static str) -> Self {
        let present = StubSwitch::default();
        present.set(true);
        Self {
            name,
            present,
            fail_calls: StubSwitch::default(),
            fail_load: false,
            detections: None,
            masks: None,
            embedder: false,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = Some(detections);
        self
    }

    pub fn with_masks(mut self, masks: Vec<RawMask>) -> Self {
        self.masks = Some(masks);
        self
    }

    pub fn with_embedder(mut self) -> Self {
        self.embedder = true;
        self
    }

    /// Start with every capability reported absent.
    pub fn absent(self) -> Self {
        self.present.set(false);
        self
    }

    /// Every `load_*` call fails.
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Switch controlling whether the backend reports its capabilities.
    pub fn presence(&self) -> StubSwitch {
        self.present.clone()
    }

    /// Switch making every inference call on loaded models fail.
    pub fn call_failures(&self) -> StubSwitch {
        self.fail_calls.clone()
    }

    /// Counter of `load_*` invocations across all capabilities.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }

    fn begin_load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(anyhow!("stub backend '{}' configured to fail loading", self.name));
        }
        Ok(())
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBackend for StubBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, capability: Capability) -> bool {
        if !self.present.get() {
            return false;
        }
        match capability {
            Capability::ObjectDetection => self.detections.is_some(),
            Capability::PersonSegmentation => self.masks.is_some(),
            Capability::FeatureEmbedding => self.embedder,
        }
    }

    fn load_detector(&self) -> Result<Box<dyn ObjectDetector>> {
        self.begin_load()?;
        let detections = self
            .detections
            .clone()
            .ok_or_else(|| anyhow!("stub backend '{}' has no detections", self.name))?;
        Ok(Box::new(StubDetector {
            detections,
            fail: self.fail_calls.clone(),
        }))
    }

    fn load_segmenter(&self) -> Result<Box<dyn InstanceSegmenter>> {
        self.begin_load()?;
        let masks = self
            .masks
            .clone()
            .ok_or_else(|| anyhow!("stub backend '{}' has no masks", self.name))?;
        Ok(Box::new(StubSegmenter {
            masks,
            fail: self.fail_calls.clone(),
        }))
    }

    fn load_embedder(&self) -> Result<Box<dyn FeatureEmbedder>> {
        self.begin_load()?;
        if !self.embedder {
            return Err(anyhow!("stub backend '{}' has no embedder", self.name));
        }
        Ok(Box::new(StubEmbedder {
            fail: self.fail_calls.clone(),
        }))
    }
}

struct StubDetector {
    detections: Vec<Detection>,
    fail: StubSwitch,
}

impl ObjectDetector for StubDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.fail.get() {
            return Err(anyhow!("stub detector call failure"));
        }
        Ok(self.detections.clone())
    }
}

struct StubSegmenter {
    masks: Vec<RawMask>,
    fail: StubSwitch,
}

impl InstanceSegmenter for StubSegmenter {
    fn segment(&mut self, _frame: &Frame) -> Result<Vec<RawMask>> {
        if self.fail.get() {
            return Err(anyhow!("stub segmenter call failure"));
        }
        Ok(self.masks.clone())
    }
}

/// Mean colour of each cell of a 4x4 grid, 48 values.
struct StubEmbedder {
    fail: StubSwitch,
}

const STUB_GRID: u32 = 4;

impl FeatureEmbedder for StubEmbedder {
    fn model_id(&self) -> &str {
        "stub-grid-4"
    }

    fn embed(&mut self, crop: &RgbaImage) -> Result<Vec<f32>> {
        if self.fail.get() {
            return Err(anyhow!("stub embedder call failure"));
        }
        if crop.width() == 0 || crop.height() == 0 {
            return Err(anyhow!("cannot embed an empty crop"));
        }
        let small = imageops::resize(crop, STUB_GRID, STUB_GRID, imageops::FilterType::Triangle);
        Ok(small
            .pixels()
            .flat_map(|p| p.0[..3].iter().map(|&c| c as f32 / 255.0).collect::<Vec<_>>())
            .collect())
    }
}
