//! Persisted vector index backed by SQLite and sqlite-vec.
//!
//! An index file is a self-describing artifact: alongside the chunk text and
//! embeddings it records which embedder produced the vectors and which chunk
//! policy produced the chunks, so readers can refuse to serve an index built
//! by an incompatible pipeline.
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Result, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::info;

pub mod search;
pub mod store;

/// On-disk layout version. Bumped whenever the schema changes shape.
pub const FORMAT_VERSION: i64 = 1;

fn schema_sql(dimensions: usize) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS index_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    format_version INTEGER NOT NULL,
    embedder_id TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    chunk_size INTEGER NOT NULL,
    chunk_overlap INTEGER NOT NULL,
    built_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    start_offset INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_document_id ON chunks(document_id);

CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
    embedding FLOAT[{dimensions}]
);
"#
    )
}

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Identity of the pipeline that produced an index artifact.
///
/// Stored as a single row and compared on every open: an index built by a
/// different embedder (or a different chunk policy) must not be served.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub format_version: i64,
    pub embedder_id: String,
    pub dimensions: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
}

impl IndexMeta {
    #[must_use]
    pub fn new(
        embedder_id: impl Into<String>,
        dimensions: usize,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            embedder_id: embedder_id.into(),
            dimensions,
            chunk_size,
            chunk_overlap,
            built_at: Utc::now(),
        }
    }
}

/// A writable handle over a SQLite index initialized with sqlite-vec and the
/// chunk schema. Used by the build side only; readers open connections via
/// [`open_read_only`].
pub struct Index {
    pub(crate) conn: Connection,
}

impl Index {
    /// Create (or re-open) an index at the given path and record its metadata.
    pub fn create<P: AsRef<Path>>(path: P, meta: &IndexMeta) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing index: {}", path.display());

        // Register sqlite-vec extension globally
        init_sqlite_vec();

        let conn = Connection::open(path)?;

        // Verify sqlite-vec is loaded
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&schema_sql(meta.dimensions))?;
        write_meta(&conn, meta)?;

        Ok(Self { conn })
    }

    /// Create an in-memory index (useful for testing).
    pub fn create_in_memory(meta: &IndexMeta) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&schema_sql(meta.dimensions))?;
        write_meta(&conn, meta)?;
        Ok(Self { conn })
    }

    /// The metadata row this index was created with.
    pub fn meta(&self) -> Result<Option<IndexMeta>> {
        read_meta(&self.conn)
    }
}

/// Open an existing index file for reading only.
///
/// Fails if the file does not exist; never creates one.
pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Connection> {
    init_sqlite_vec();
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Read the metadata row from an index connection.
///
/// Returns `Ok(None)` when the database has no `index_meta` table or no row
/// in it, which readers treat as "not a built index".
pub fn read_meta(conn: &Connection) -> Result<Option<IndexMeta>> {
    let has_table: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'index_meta'",
        [],
        |row| row.get(0),
    )?;
    if has_table == 0 {
        return Ok(None);
    }

    conn.query_row(
        "SELECT format_version, embedder_id, dimensions, chunk_size, chunk_overlap, built_at
         FROM index_meta WHERE id = 1",
        [],
        |row| {
            Ok(IndexMeta {
                format_version: row.get(0)?,
                embedder_id: row.get(1)?,
                dimensions: row.get::<_, i64>(2)? as usize,
                chunk_size: row.get::<_, i64>(3)? as usize,
                chunk_overlap: row.get::<_, i64>(4)? as usize,
                built_at: row.get(5)?,
            })
        },
    )
    .optional()
}

fn write_meta(conn: &Connection, meta: &IndexMeta) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO index_meta
         (id, format_version, embedder_id, dimensions, chunk_size, chunk_overlap, built_at)
         VALUES (1, ?, ?, ?, ?, ?, ?)",
        params![
            meta.format_version,
            meta.embedder_id,
            meta.dimensions as i64,
            meta.chunk_size as i64,
            meta.chunk_overlap as i64,
            meta.built_at,
        ],
    )?;
    Ok(())
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}
