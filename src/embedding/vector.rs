use serde::{Deserialize, Serialize};

/// Candidates at or above this similarity count as the same instance.
pub const FEATURE_SIMILARITY_THRESHOLD: f32 = 0.65;

/// Mechanism that produced an embedding. Vectors from different mechanisms
/// are never compared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EmbeddingSource {
    /// A loaded feature model, identified by its model id.
    Model { id: String },
    /// The deterministic colour fingerprint at the given square size.
    Fingerprint { size: u32 },
}

/// Visual feature vector of a cropped region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub source: EmbeddingSource,
    pub values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(source: EmbeddingSource, values: Vec<f32>) -> Self {
        Self { source, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Similarity in `[0, 1]`, or `None` when the two vectors come from
    /// different mechanisms.
    pub fn similarity(&self, other: &EmbeddingVector) -> Option<f32> {
        if self.source != other.source {
            return None;
        }
        Some(cosine_similarity(&self.values, &other.values))
    }
}

/// Cosine similarity remapped from `[-1, 1]` to `[0, 1]`.
///
/// Returns 0 for empty or mismatched vectors and when either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 || !(norm_a.is_finite() && norm_b.is_finite()) {
        return 0.0;
    }
    let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    ((cos + 1.0) / 2.0) as f32
}
