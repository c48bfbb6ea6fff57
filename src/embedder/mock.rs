/// Mock embedder for testing purposes.
///
/// Produces deterministic hashed bag-of-words vectors: each token is hashed
/// into a bucket, so texts sharing words land closer together than disjoint
/// ones. That makes retrieval-ranking tests meaningful without loading a
/// real ONNX model.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

/// A mock embedder that produces deterministic vectors from token hashes.
pub struct MockEmbedder {
    dimensions: usize,
    id: String,
    max_input_chars: Option<usize>,
}

impl MockEmbedder {
    /// Create a new `MockEmbedder` with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            id: "mock-bow-v1".to_string(),
            max_input_chars: None,
        }
    }

    /// Override the model identifier (for version-mismatch tests).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Reject inputs longer than `max_chars` characters, like a real model
    /// rejects over-long token sequences.
    #[must_use]
    pub fn with_input_limit(mut self, max_chars: usize) -> Self {
        self.max_input_chars = Some(max_chars);
        self
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        if let Some(limit) = self.max_input_chars {
            let chars = text.chars().count();
            if chars > limit {
                return Err(EmbedderError::InputTooLong {
                    tokens: chars,
                    limit,
                });
            }
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            embedding[self.bucket(&token)] += 1.0;
        }

        // L2 normalize; all-zero (no tokens) stays all-zero
        let norm_sq: f32 = embedding.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut embedding {
                *v *= inv;
            }
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn id(&self) -> &str {
        &self.id
    }
}
