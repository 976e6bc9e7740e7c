use std::sync::{Arc, PoisonError};

use anyhow::{anyhow, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::fingerprint::{fingerprint, FINGERPRINT_SIZE};
use super::vector::{EmbeddingSource, EmbeddingVector, FEATURE_SIMILARITY_THRESHOLD};
use crate::detect::{
    BackendRegistry, Capability, FeatureEmbedder, LazyModel, LoadState, SharedModel,
};
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Outcome of checking a candidate region against a stored reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "camelCase")]
pub enum Verdict {
    Accepted { similarity: f32 },
    Rejected { similarity: f32 },
    /// Embedding could not be computed or compared; the class match stands.
    Skipped { reason: String },
}

impl Verdict {
    /// Whether the game should let the player through. Skipped fails open.
    pub fn allows(&self) -> bool {
        !matches!(self, Verdict::Rejected { .. })
    }
}

/// Feature-embedding disambiguator for telling two instances of one class apart.
pub struct Disambiguator {
    registry: Arc<BackendRegistry>,
    model: LazyModel<dyn FeatureEmbedder>,
    fingerprint_size: u32,
    threshold: f32,
}

impl Disambiguator {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            model: LazyModel::new("feature embedding"),
            fingerprint_size: FINGERPRINT_SIZE,
            threshold: FEATURE_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_fingerprint_size(mut self, size: u32) -> Self {
        self.fingerprint_size = size;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn state(&self) -> LoadState {
        self.model.state()
    }

    pub fn is_model_available(&self) -> bool {
        match self.model.state() {
            LoadState::Ready => true,
            LoadState::Unavailable => false,
            LoadState::Unloaded | LoadState::Loading => {
                self.registry.supports(Capability::FeatureEmbedding)
            }
        }
    }

    fn load(&self) -> Option<SharedModel<dyn FeatureEmbedder>> {
        if let Some(model) = self.model.ready() {
            return Some(model);
        }
        let backend = self.registry.backend_for(Capability::FeatureEmbedding)?;
        self.model.get_or_load(|| {
            log::info!("loading feature embedder from backend '{}'", backend.name());
            backend.load_embedder()
        })
    }

    fn embed_with_model(
        model: &SharedModel<dyn FeatureEmbedder>,
        crop: &RgbaImage,
    ) -> Result<EmbeddingVector> {
        let mut embedder = model.lock().unwrap_or_else(PoisonError::into_inner);
        let values = embedder.embed(crop)?;
        if values.is_empty() {
            return Err(anyhow!("embedder '{}' returned an empty vector", embedder.model_id()));
        }
        Ok(EmbeddingVector::new(
            EmbeddingSource::Model {
                id: embedder.model_id().to_string(),
            },
            values,
        ))
    }

    /// Embed a crop with the feature model when one loads, otherwise with the
    /// colour fingerprint.
    pub fn compute_embedding(&self, crop: &RgbaImage) -> Result<EmbeddingVector> {
        match self.load() {
            Some(model) => Self::embed_with_model(&model, crop),
            None => fingerprint(crop, self.fingerprint_size),
        }
    }

    /// Embed `crop` with the same mechanism that produced `reference`.
    pub fn compute_embedding_like(
        &self,
        reference: &EmbeddingSource,
        crop: &RgbaImage,
    ) -> Result<EmbeddingVector> {
        match reference {
            EmbeddingSource::Fingerprint { size } => fingerprint(crop, *size),
            EmbeddingSource::Model { id } => {
                let model = self
                    .load()
                    .ok_or_else(|| anyhow!("feature model '{}' is not available", id))?;
                let candidate = Self::embed_with_model(&model, crop)?;
                if candidate.source != *reference {
                    return Err(anyhow!(
                        "reference was embedded by '{}', loaded model differs",
                        id
                    ));
                }
                Ok(candidate)
            }
        }
    }

    /// Crop `bbox` out of `frame` and embed it; `None` on any failure.
    pub fn embed_region(&self, frame: &Frame, bbox: &BoundingBox) -> Option<EmbeddingVector> {
        match frame.crop(bbox).and_then(|crop| self.compute_embedding(&crop)) {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                log::warn!("could not embed selected region: {:#}", e);
                None
            }
        }
    }

    /// Compare the region under `bbox` against a stored reference.
    pub fn verify(
        &self,
        reference: &EmbeddingVector,
        frame: &Frame,
        bbox: &BoundingBox,
    ) -> Verdict {
        let candidate = frame
            .crop(bbox)
            .and_then(|crop| self.compute_embedding_like(&reference.source, &crop));
        let candidate = match candidate {
            Ok(candidate) => candidate,
            Err(e) => {
                log::warn!("embedding check skipped, allowing class match: {:#}", e);
                return Verdict::Skipped {
                    reason: format!("{:#}", e),
                };
            }
        };
        let Some(similarity) = reference.similarity(&candidate) else {
            log::warn!("reference and candidate embeddings are incomparable, allowing class match");
            return Verdict::Skipped {
                reason: "incomparable embeddings".to_string(),
            };
        };
        log::debug!(
            "feature similarity {:.3} (threshold {:.2})",
            similarity,
            self.threshold
        );
        if similarity >= self.threshold {
            Verdict::Accepted { similarity }
        } else {
            Verdict::Rejected { similarity }
        }
    }
}
