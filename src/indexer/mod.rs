//! Corpus indexing: load documents, chunk them, embed the chunks, and
//! persist the result as a fresh index artifact.
//!
//! A build is all-or-nothing. Embedding failures abort the whole run and the
//! artifact is written to a temporary file that only replaces the live index
//! once it is complete, so readers never observe a partial index.
use thiserror::Error;

use crate::embedder::EmbedderError;

pub mod build;
pub mod chunker;
pub mod loader;

pub use build::{BuildReport, IndexBuilder};
pub use chunker::{TextChunk, sliding_window};
pub use loader::{Document, load_documents, resolve_corpus_files};

/// Errors surfaced while building an index.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error(
        "invalid chunk policy: overlap ({overlap}) must be smaller than chunk size ({size}) and chunk size must be nonzero"
    )]
    InvalidChunkPolicy { size: usize, overlap: usize },

    #[error("failed to load document {id}: {reason}")]
    DocumentLoad { id: String, reason: String },

    #[error("embedding failed for document {document_id}: {source}")]
    Embedding {
        document_id: String,
        #[source]
        source: EmbedderError,
    },

    #[error("index storage failed: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to persist index artifact: {0}")]
    Persist(#[from] std::io::Error),

    #[error("embed worker failed: {0}")]
    Worker(String),
}
