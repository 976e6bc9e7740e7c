use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::detect::{INITIAL_SCORE_THRESHOLD, LIVE_SCORE_THRESHOLD};
use crate::detect::classes::PERSON_CLASS;
use crate::embedding::{FEATURE_SIMILARITY_THRESHOLD, FINGERPRINT_SIZE, MAX_FINGERPRINT_SIZE};
use crate::geometry::FitMode;
use crate::overlay::{LabelCatalog, DEFAULT_RETRY_LIMIT};
use crate::reconcile::MASK_MATCH_IOU_THRESHOLD;
use crate::segment::MASK_ALPHA_THRESHOLD;

pub const CONFIG_ENV: &str = "TREASURE_LENS_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    detection: Option<DetectionConfigFile>,
    segmentation: Option<SegmentationConfigFile>,
    embedding: Option<EmbeddingConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    initial_score_threshold: Option<f32>,
    live_score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SegmentationConfigFile {
    classes: Option<Vec<String>>,
    mask_iou_threshold: Option<f32>,
    mask_alpha_threshold: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct EmbeddingConfigFile {
    similarity_threshold: Option<f32>,
    fingerprint_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    fit: Option<FitMode>,
    retry_limit: Option<u32>,
    labels: Option<HashMap<String, String>>,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub detection: DetectionSettings,
    pub segmentation: SegmentationSettings,
    pub embedding: EmbeddingSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub initial_score_threshold: f32,
    pub live_score_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationSettings {
    pub segmentable_classes: Vec<String>,
    pub mask_iou_threshold: f32,
    pub mask_alpha_threshold: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub similarity_threshold: f32,
    pub fingerprint_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub fit_mode: FitMode,
    pub retry_limit: u32,
    pub labels: HashMap<String, String>,
    pub labels_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Defaults, then the file named by `TREASURE_LENS_CONFIG`, then
    /// `TREASURE_LENS_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit file instead of the env lookup.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let detection = DetectionSettings {
            initial_score_threshold: file
                .detection
                .as_ref()
                .and_then(|d| d.initial_score_threshold)
                .unwrap_or(INITIAL_SCORE_THRESHOLD),
            live_score_threshold: file
                .detection
                .as_ref()
                .and_then(|d| d.live_score_threshold)
                .unwrap_or(LIVE_SCORE_THRESHOLD),
        };
        let segmentation = SegmentationSettings {
            segmentable_classes: file
                .segmentation
                .as_ref()
                .and_then(|s| s.classes.clone())
                .unwrap_or_else(|| vec![PERSON_CLASS.to_string()]),
            mask_iou_threshold: file
                .segmentation
                .as_ref()
                .and_then(|s| s.mask_iou_threshold)
                .unwrap_or(MASK_MATCH_IOU_THRESHOLD),
            mask_alpha_threshold: file
                .segmentation
                .as_ref()
                .and_then(|s| s.mask_alpha_threshold)
                .unwrap_or(MASK_ALPHA_THRESHOLD),
        };
        let embedding = EmbeddingSettings {
            similarity_threshold: file
                .embedding
                .as_ref()
                .and_then(|e| e.similarity_threshold)
                .unwrap_or(FEATURE_SIMILARITY_THRESHOLD),
            fingerprint_size: file
                .embedding
                .as_ref()
                .and_then(|e| e.fingerprint_size)
                .unwrap_or(FINGERPRINT_SIZE),
        };
        let overlay_file = file.overlay.unwrap_or_default();
        let overlay = OverlaySettings {
            fit_mode: overlay_file.fit.unwrap_or_default(),
            retry_limit: overlay_file.retry_limit.unwrap_or(DEFAULT_RETRY_LIMIT),
            labels: overlay_file.labels.unwrap_or_default(),
            labels_path: overlay_file.labels_path,
        };
        Self {
            detection,
            segmentation,
            embedding,
            overlay,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_f32("TREASURE_LENS_INITIAL_THRESHOLD")? {
            self.detection.initial_score_threshold = v;
        }
        if let Some(v) = env_f32("TREASURE_LENS_LIVE_THRESHOLD")? {
            self.detection.live_score_threshold = v;
        }
        if let Some(v) = env_f32("TREASURE_LENS_MASK_IOU")? {
            self.segmentation.mask_iou_threshold = v;
        }
        if let Some(v) = env_f32("TREASURE_LENS_SIMILARITY")? {
            self.embedding.similarity_threshold = v;
        }
        if let Ok(classes) = std::env::var("TREASURE_LENS_SEGMENT_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.segmentation.segmentable_classes = parsed;
            }
        }
        if let Ok(retries) = std::env::var("TREASURE_LENS_OVERLAY_RETRIES") {
            self.overlay.retry_limit = retries.trim().parse().map_err(|_| {
                anyhow!("TREASURE_LENS_OVERLAY_RETRIES must be a non-negative integer")
            })?;
        }
        if let Ok(fit) = std::env::var("TREASURE_LENS_FIT") {
            if !fit.trim().is_empty() {
                self.overlay.fit_mode = fit.parse()?;
            }
        }
        if let Ok(path) = std::env::var("TREASURE_LENS_LABELS") {
            if !path.trim().is_empty() {
                self.overlay.labels_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        for (name, value) in [
            ("initial_score_threshold", self.detection.initial_score_threshold),
            ("live_score_threshold", self.detection.live_score_threshold),
            ("mask_iou_threshold", self.segmentation.mask_iou_threshold),
            ("similarity_threshold", self.embedding.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.overlay.retry_limit == 0 {
            return Err(anyhow!("overlay retry_limit must be greater than zero"));
        }
        if !(1..=MAX_FINGERPRINT_SIZE).contains(&self.embedding.fingerprint_size) {
            return Err(anyhow!(
                "fingerprint_size must be within 1..={}, got {}",
                MAX_FINGERPRINT_SIZE,
                self.embedding.fingerprint_size
            ));
        }
        self.segmentation.segmentable_classes = self
            .segmentation
            .segmentable_classes
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        Ok(())
    }

    /// Display names: built-in defaults, then the labels file, then inline labels.
    pub fn label_catalog(&self) -> Result<LabelCatalog> {
        let mut catalog = LabelCatalog::default();
        if let Some(path) = &self.overlay.labels_path {
            catalog = catalog.with_file(path)?;
        }
        Ok(catalog.with_overrides(&self.overlay.labels))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_file(PipelineConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_f32(name: &str) -> Result<Option<f32>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => {
            let parsed = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("{} must be a number", name))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
