//! # MediGuide — retrieval-augmented medical question answering
//!
//! Offline, a corpus of reference documents is split into overlapping chunks,
//! embedded, and persisted as a single SQLite artifact (sqlite-vec). Online,
//! a question is embedded, the nearest chunks are retrieved, and a grounded
//! prompt is sent to an OpenAI-compatible chat provider with a
//! primary/fallback credential pair.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration loading, defaults, and validation
//! - **[`embedder`]** — Text embedding via ONNX Runtime (all-MiniLM-L6-v2)
//! - **[`index`]** — SQLite + sqlite-vec artifact: schema, chunk store, KNN search
//! - **[`indexer`]** — Corpus loading, sliding-window chunking, offline index build
//! - **[`retriever`]** — Read-only index snapshot, top-K similarity retrieval
//! - **[`prompt`]** — Target-language handling and prompt composition
//! - **[`generator`]** — Chat completion with one fallback attempt on transient failure
//! - **[`pipeline`]** — The orchestrator: retrieve → compose → generate

pub mod config;
pub mod embedder;
pub mod generator;
pub mod index;
pub mod indexer;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
