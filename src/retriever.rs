//! Read-side retrieval over a built index artifact.
//!
//! A [`Retriever`] serves queries from an immutable snapshot: a pool of
//! read-only connections plus the metadata the artifact was built with.
//! [`Retriever::reload`] loads the artifact fresh and swaps the snapshot in
//! behind a write lock held only for the swap itself, so in-flight reads
//! finish against the snapshot they started on.
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::info;

use crate::embedder::{Embedder, EmbedderError};
use crate::index::search::{SearchResult, knn_search};
use crate::index::{FORMAT_VERSION, IndexMeta, open_read_only, read_meta};

/// Why an index artifact cannot be served.
#[derive(Debug, Error)]
pub enum IndexUnavailableError {
    #[error("index not found at {path}; build it first")]
    Missing { path: String },

    #[error("{path} is not a built index (no metadata recorded)")]
    NotBuilt { path: String },

    #[error("index format version {found} is not supported (expected {expected})")]
    FormatVersion { found: i64, expected: i64 },

    #[error(
        "index was built with embedder '{index_embedder}' but the active embedder is '{active_embedder}'; rebuild the index"
    )]
    EmbedderMismatch {
        index_embedder: String,
        active_embedder: String,
    },

    #[error(
        "index stores {index_dimensions}-dimensional vectors but the active embedder produces {active_dimensions}"
    )]
    DimensionsMismatch {
        index_dimensions: usize,
        active_dimensions: usize,
    },

    #[error("failed to open index: {0}")]
    Open(#[from] rusqlite::Error),

    #[error("failed to initialize read pool: {0}")]
    Pool(String),
}

/// Errors surfaced while answering a retrieval request.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error(transparent)]
    IndexUnavailable(#[from] IndexUnavailableError),

    #[error("failed to embed query: {0}")]
    QueryEmbedding(#[from] EmbedderError),

    #[error("index search failed: {0}")]
    Search(#[from] rusqlite::Error),

    #[error("read pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("snapshot lock poisoned")]
    Lock,
}

/// r2d2 manager handing out read-only connections to one artifact file.
///
/// Connections keep reading the file they were opened on even after a rebuild
/// renames a new artifact over the path, which is exactly the snapshot
/// behavior the retriever wants.
struct ReadOnlyIndex {
    path: PathBuf,
}

impl r2d2::ManageConnection for ReadOnlyIndex {
    type Connection = rusqlite::Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        open_read_only(&self.path)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

struct Snapshot {
    pool: r2d2::Pool<ReadOnlyIndex>,
    meta: IndexMeta,
}

impl Snapshot {
    fn load(
        path: &Path,
        embedder_id: &str,
        dimensions: usize,
        pool_size: u32,
    ) -> Result<Self, IndexUnavailableError> {
        if !path.exists() {
            return Err(IndexUnavailableError::Missing {
                path: path.display().to_string(),
            });
        }

        let meta = {
            let conn = open_read_only(path)?;
            read_meta(&conn)?.ok_or_else(|| IndexUnavailableError::NotBuilt {
                path: path.display().to_string(),
            })?
        };

        if meta.format_version != FORMAT_VERSION {
            return Err(IndexUnavailableError::FormatVersion {
                found: meta.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if meta.embedder_id != embedder_id {
            return Err(IndexUnavailableError::EmbedderMismatch {
                index_embedder: meta.embedder_id.clone(),
                active_embedder: embedder_id.to_string(),
            });
        }
        if meta.dimensions != dimensions {
            return Err(IndexUnavailableError::DimensionsMismatch {
                index_dimensions: meta.dimensions,
                active_dimensions: dimensions,
            });
        }

        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .build(ReadOnlyIndex {
                path: path.to_path_buf(),
            })
            .map_err(|e| IndexUnavailableError::Pool(e.to_string()))?;

        info!(
            "Index snapshot loaded: {} (embedder {}, built {})",
            path.display(),
            meta.embedder_id,
            meta.built_at
        );

        Ok(Self { pool, meta })
    }
}

/// Serves similarity queries against the current index snapshot.
pub struct Retriever<E: Embedder> {
    path: PathBuf,
    embedder: Arc<E>,
    pool_size: u32,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl<E: Embedder> Retriever<E> {
    /// Open the artifact at `path` and verify it matches the active embedder.
    ///
    /// Refuses to serve an index with a different format version, embedder
    /// identity, or vector width than the embedder supplied here.
    pub fn open<P: AsRef<Path>>(
        path: P,
        embedder: Arc<E>,
        pool_size: u32,
    ) -> Result<Self, IndexUnavailableError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = Snapshot::load(&path, embedder.id(), embedder.dimensions(), pool_size)?;
        Ok(Self {
            path,
            embedder,
            pool_size,
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Metadata of the snapshot currently being served.
    pub fn meta(&self) -> Result<IndexMeta, RetrieveError> {
        let snapshot = self.snapshot.read().map_err(|_| RetrieveError::Lock)?;
        Ok(snapshot.meta.clone())
    }

    /// Return up to `k` chunks ranked by descending similarity to `query`.
    ///
    /// Ties are broken by ascending chunk id. `k == 0` and an empty index are
    /// both answered with an empty vector, never an error.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, RetrieveError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // Take an owned handle on the current snapshot; the read lock is
        // held only for this clone, never across the embed or the search.
        let snapshot = {
            let guard = self.snapshot.read().map_err(|_| RetrieveError::Lock)?;
            Arc::clone(&guard)
        };

        let query_vector = self.embedder.embed(query)?;

        let conn = snapshot
            .pool
            .get()
            .map_err(|e| RetrieveError::PoolExhausted(e.to_string()))?;
        let results = knn_search(&conn, &query_vector, k)?;
        Ok(results)
    }

    /// Re-open the artifact and swap it in as the serving snapshot.
    ///
    /// The same compatibility checks as [`Retriever::open`] run against the
    /// fresh file, outside the lock; the write lock is held only for the
    /// pointer swap. Callers holding the previous snapshot finish unaffected.
    pub fn reload(&self) -> Result<(), RetrieveError> {
        let snapshot = Snapshot::load(
            &self.path,
            self.embedder.id(),
            self.embedder.dimensions(),
            self.pool_size,
        )?;

        let mut guard = self.snapshot.write().map_err(|_| RetrieveError::Lock)?;
        *guard = Arc::new(snapshot);
        Ok(())
    }
}
