/// Embedder trait and shared types for text embedding.
///
/// Both index building and query-time retrieval go through this trait, so a
/// persisted index can be checked against the runtime embedder via [`Embedder::id`].
pub mod download;
pub mod mock;
pub mod onnx;
pub mod tokenizer;

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    /// The input is longer than the model accepts. The embedder never
    /// truncates silently — a truncated embedding would no longer correspond
    /// to the stored chunk text.
    #[error("input too long: {tokens} tokens exceeds the model limit of {limit}")]
    InputTooLong { tokens: usize, limit: usize },

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`. For a fixed model version, `embed` must be deterministic:
/// the same text always produces the same vector.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, preserving input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Stable model identifier, recorded in the index artifact and compared
    /// at load time. Two embedders with the same id must produce identical
    /// vectors for identical input.
    fn id(&self) -> &str;
}
