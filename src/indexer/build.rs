use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chunker::{TextChunk, sliding_window};
use super::loader::Document;
use super::IndexBuildError;
use crate::embedder::Embedder;
use crate::index::store::ChunkRecord;
use crate::index::{Index, IndexMeta};

/// Counts reported after a successful build.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Builds a fresh index artifact from a document set.
///
/// Embedding runs on a bounded pool of blocking workers; insertion happens
/// afterwards on the single build connection, in document order, so chunk ids
/// come out identical across rebuilds of the same corpus.
pub struct IndexBuilder<E: Embedder + Send + Sync + 'static> {
    embedder: Arc<E>,
    chunk_size: usize,
    chunk_overlap: usize,
    embed_workers: usize,
    embed_batch_size: usize,
}

impl<E: Embedder + Send + Sync + 'static> IndexBuilder<E> {
    /// Create a builder with the given chunk policy.
    ///
    /// Rejects a zero chunk size or an overlap that does not leave the window
    /// room to advance.
    pub fn new(
        embedder: Arc<E>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self, IndexBuildError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(IndexBuildError::InvalidChunkPolicy {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            embedder,
            chunk_size,
            chunk_overlap,
            embed_workers: 4,
            embed_batch_size: 32,
        })
    }

    #[must_use]
    pub fn with_concurrency(mut self, embed_workers: usize, embed_batch_size: usize) -> Self {
        self.embed_workers = embed_workers.max(1);
        self.embed_batch_size = embed_batch_size.max(1);
        self
    }

    /// Chunk, embed, and persist `documents` as a new artifact at `out_path`.
    ///
    /// Any embedding failure aborts the whole build. The artifact is staged
    /// at `<out_path>.tmp` and renamed over the live file only once complete,
    /// so a reader never observes a partial index and the previous artifact
    /// survives a failed rebuild.
    pub async fn build<P: AsRef<Path>>(
        &self,
        documents: &[Document],
        out_path: P,
    ) -> Result<BuildReport, IndexBuildError> {
        let out_path = out_path.as_ref();

        if documents.is_empty() {
            warn!("Building an index over an empty corpus");
        }

        let doc_chunks: Vec<Vec<TextChunk>> = documents
            .iter()
            .map(|doc| sliding_window(&doc.text, self.chunk_size, self.chunk_overlap))
            .collect();
        let total_chunks: usize = doc_chunks.iter().map(Vec::len).sum();
        info!(
            "Chunked {} documents into {} chunks",
            documents.len(),
            total_chunks
        );

        let doc_vectors = self.embed_all(documents, &doc_chunks).await?;

        if let Some(parent) = out_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = staging_path(out_path);
        if staging.exists() {
            debug!("Removing stale staging file: {}", staging.display());
            fs::remove_file(&staging)?;
        }

        let meta = IndexMeta::new(
            self.embedder.id(),
            self.embedder.dimensions(),
            self.chunk_size,
            self.chunk_overlap,
        );

        let result = self
            .write_artifact(&staging, &meta, documents, &doc_chunks, &doc_vectors)
            .and_then(|()| fs::rename(&staging, out_path).map_err(IndexBuildError::from));
        if let Err(e) = result {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        info!("Index written: {}", out_path.display());
        Ok(BuildReport {
            documents: documents.len(),
            chunks: total_chunks,
        })
    }

    /// Embed every chunk on a bounded pool of blocking workers.
    ///
    /// Batches are spawned and awaited in document order, so the returned
    /// per-document vectors line up with the chunk order even though the
    /// embedding work itself runs concurrently.
    async fn embed_all(
        &self,
        documents: &[Document],
        doc_chunks: &[Vec<TextChunk>],
    ) -> Result<Vec<Vec<Vec<f32>>>, IndexBuildError> {
        let semaphore = Arc::new(Semaphore::new(self.embed_workers));
        let mut handles: Vec<JoinHandle<Result<Vec<Vec<f32>>, IndexBuildError>>> = Vec::new();
        let mut handle_docs: Vec<usize> = Vec::new();

        for (doc_idx, chunks) in doc_chunks.iter().enumerate() {
            for batch in chunks.chunks(self.embed_batch_size) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let document_id = documents[doc_idx].id.clone();
                let semaphore = Arc::clone(&semaphore);
                let embedder = Arc::clone(&self.embedder);

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| IndexBuildError::Worker(e.to_string()))?;
                    let result = tokio::task::spawn_blocking(move || {
                        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                        embedder.embed_batch(&refs)
                    })
                    .await
                    .map_err(|e| IndexBuildError::Worker(e.to_string()))?;
                    result.map_err(|source| IndexBuildError::Embedding {
                        document_id,
                        source,
                    })
                }));
                handle_docs.push(doc_idx);
            }
        }

        let mut doc_vectors: Vec<Vec<Vec<f32>>> = documents.iter().map(|_| Vec::new()).collect();
        for (handle, doc_idx) in handles.into_iter().zip(handle_docs) {
            let vectors = handle
                .await
                .map_err(|e| IndexBuildError::Worker(e.to_string()))??;
            doc_vectors[doc_idx].extend(vectors);
        }

        Ok(doc_vectors)
    }

    fn write_artifact(
        &self,
        staging: &Path,
        meta: &IndexMeta,
        documents: &[Document],
        doc_chunks: &[Vec<TextChunk>],
        doc_vectors: &[Vec<Vec<f32>>],
    ) -> Result<(), IndexBuildError> {
        let mut index = Index::create(staging, meta)?;

        for ((document, chunks), vectors) in documents.iter().zip(doc_chunks).zip(doc_vectors) {
            let records: Vec<ChunkRecord<'_>> = chunks
                .iter()
                .map(|chunk| ChunkRecord {
                    document_id: &document.id,
                    position: chunk.position,
                    offset: chunk.offset,
                    text: &chunk.text,
                })
                .collect();
            index.insert_document_chunks(&records, vectors)?;
        }

        // Connection closes here, before the rename.
        Ok(())
    }
}

fn staging_path(out_path: &Path) -> PathBuf {
    let mut os = out_path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::index::{open_read_only, read_meta};
    use tempfile::tempdir;

    fn doc(id: &str, text: &str) -> Document {
        Document {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    fn chunk_rows(path: &Path) -> Vec<(i64, String, i64, String)> {
        let conn = open_read_only(path).unwrap();
        let mut stmt = conn
            .prepare("SELECT id, document_id, position, content FROM chunks ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        rows
    }

    #[tokio::test]
    async fn test_build_writes_artifact() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.db");
        let embedder = Arc::new(MockEmbedder::new(8));
        let builder = IndexBuilder::new(embedder, 40, 10).unwrap();

        let documents = vec![
            doc(
                "fever.txt",
                "Paracetamol reduces fever and relieves mild pain in adults.",
            ),
            doc("hydration.txt", "Drink plenty of fluids when unwell."),
        ];

        let report = builder.build(&documents, &out).await.unwrap();
        assert_eq!(report.documents, 2);
        assert!(report.chunks >= 2);
        assert!(out.exists());
        assert!(!dir.path().join("index.db.tmp").exists());

        let conn = open_read_only(&out).unwrap();
        let meta = read_meta(&conn).unwrap().expect("meta row present");
        assert_eq!(meta.embedder_id, "mock-bow-v1");
        assert_eq!(meta.dimensions, 8);
        assert_eq!(meta.chunk_size, 40);
        assert_eq!(meta.chunk_overlap, 10);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, report.chunks);
    }

    #[tokio::test]
    async fn test_build_aborts_on_embed_failure() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.db");
        let embedder = Arc::new(MockEmbedder::new(8).with_input_limit(10));
        let builder = IndexBuilder::new(embedder, 500, 50).unwrap();

        let documents = vec![doc(
            "long.txt",
            "This text is far longer than the embedder accepts.",
        )];

        let err = builder.build(&documents, &out).await.unwrap_err();
        assert!(matches!(err, IndexBuildError::Embedding { .. }));
        assert!(!out.exists());
        assert!(!dir.path().join("index.db.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_artifact() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.db");

        let builder = IndexBuilder::new(Arc::new(MockEmbedder::new(8)), 500, 50).unwrap();
        let documents = vec![doc("fever.txt", "Paracetamol reduces fever.")];
        let report = builder.build(&documents, &out).await.unwrap();

        let failing =
            IndexBuilder::new(Arc::new(MockEmbedder::new(8).with_input_limit(5)), 500, 50)
                .unwrap();
        let err = failing.build(&documents, &out).await.unwrap_err();
        assert!(matches!(err, IndexBuildError::Embedding { .. }));

        // The earlier artifact is untouched.
        let rows = chunk_rows(&out);
        assert_eq!(rows.len(), report.chunks);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_whole_artifact() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.db");
        let builder = IndexBuilder::new(Arc::new(MockEmbedder::new(8)), 500, 50).unwrap();

        let first = vec![
            doc("a.txt", "Paracetamol reduces fever."),
            doc("b.txt", "Drink plenty of fluids."),
        ];
        builder.build(&first, &out).await.unwrap();

        let second = vec![doc("c.txt", "Rest helps recovery.")];
        builder.build(&second, &out).await.unwrap();

        let rows = chunk_rows(&out);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "c.txt");
    }

    #[tokio::test]
    async fn test_rebuilds_are_stable() {
        let dir = tempdir().unwrap();
        let out_a = dir.path().join("a.db");
        let out_b = dir.path().join("b.db");
        let builder = IndexBuilder::new(Arc::new(MockEmbedder::new(8)), 30, 10)
            .unwrap()
            .with_concurrency(4, 2);

        let documents = vec![
            doc(
                "fever.txt",
                "Paracetamol reduces fever and relieves mild pain in adults and children.",
            ),
            doc(
                "hydration.txt",
                "Drink plenty of fluids and rest while recovering from illness.",
            ),
        ];

        builder.build(&documents, &out_a).await.unwrap();
        builder.build(&documents, &out_b).await.unwrap();

        assert_eq!(chunk_rows(&out_a), chunk_rows(&out_b));
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_index() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("index.db");
        let builder = IndexBuilder::new(Arc::new(MockEmbedder::new(8)), 500, 50).unwrap();

        let report = builder.build(&[], &out).await.unwrap();
        assert_eq!(report, BuildReport::default());
        assert!(out.exists());

        let conn = open_read_only(&out).unwrap();
        assert!(read_meta(&conn).unwrap().is_some());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_invalid_chunk_policy_rejected() {
        let embedder = Arc::new(MockEmbedder::new(8));
        assert!(matches!(
            IndexBuilder::new(Arc::clone(&embedder), 100, 100),
            Err(IndexBuildError::InvalidChunkPolicy { .. })
        ));
        assert!(matches!(
            IndexBuilder::new(Arc::clone(&embedder), 100, 250),
            Err(IndexBuildError::InvalidChunkPolicy { .. })
        ));
        assert!(matches!(
            IndexBuilder::new(embedder, 0, 0),
            Err(IndexBuildError::InvalidChunkPolicy { .. })
        ));
    }
}
