//! Visual feature embeddings for telling instances of one class apart.

mod disambiguator;
pub mod fingerprint;
mod vector;

pub use disambiguator::{Disambiguator, Verdict};
pub use fingerprint::{fingerprint, FINGERPRINT_SIZE, MAX_FINGERPRINT_SIZE};
pub use vector::{cosine_similarity, EmbeddingSource, EmbeddingVector, FEATURE_SIMILARITY_THRESHOLD};
