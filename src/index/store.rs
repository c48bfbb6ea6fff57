use super::{Index, serialize_vector};
use rusqlite::{Result, params};

/// A chunk ready for insertion, borrowing from the build pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRecord<'a> {
    pub document_id: &'a str,
    /// Ordinal of the chunk within its document, starting at 0.
    pub position: usize,
    /// Character offset of the chunk start within the document text.
    pub offset: usize,
    pub text: &'a str,
}

impl Index {
    /// Insert all chunks of one document with their embeddings, transactionally.
    ///
    /// Chunk ids are assigned in insertion order, so chunks inserted earlier
    /// always carry smaller ids.
    pub fn insert_document_chunks(
        &mut self,
        records: &[ChunkRecord<'_>],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        assert_eq!(
            records.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;

        for (i, record) in records.iter().enumerate() {
            tx.execute(
                "INSERT INTO chunks (document_id, position, start_offset, content) VALUES (?, ?, ?, ?)",
                params![
                    record.document_id,
                    record.position as i64,
                    record.offset as i64,
                    record.text
                ],
            )?;
            let chunk_id = tx.last_insert_rowid();

            let vector_blob = serialize_vector(&embeddings[i]);
            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![chunk_id, vector_blob],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Number of chunks stored in the index.
    pub fn chunk_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
    }

    /// Number of distinct documents represented in the index.
    pub fn document_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(DISTINCT document_id) FROM chunks", [], |row| {
                row.get(0)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexMeta;

    fn open_test_index() -> Index {
        Index::create_in_memory(&IndexMeta::new("mock-bow-v1", 4, 100, 20)).unwrap()
    }

    #[test]
    fn test_insert_chunks() {
        let mut index = open_test_index();

        let records = vec![
            ChunkRecord {
                document_id: "fever.txt",
                position: 0,
                offset: 0,
                text: "Hello",
            },
            ChunkRecord {
                document_id: "fever.txt",
                position: 1,
                offset: 80,
                text: "World",
            },
        ];
        let embeddings = vec![vec![0.1; 4], vec![0.2; 4]];

        index.insert_document_chunks(&records, &embeddings).unwrap();

        assert_eq!(index.chunk_count().unwrap(), 2);
        assert_eq!(index.document_count().unwrap(), 1);

        let vec_rows: i64 = index
            .conn
            .query_row("SELECT COUNT(*) FROM vec_chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_rows, 2);
    }

    #[test]
    fn test_chunk_ids_follow_insertion_order() {
        let mut index = open_test_index();

        let first = vec![ChunkRecord {
            document_id: "a.txt",
            position: 0,
            offset: 0,
            text: "alpha",
        }];
        let second = vec![ChunkRecord {
            document_id: "b.txt",
            position: 0,
            offset: 0,
            text: "beta",
        }];
        index
            .insert_document_chunks(&first, &[vec![0.0; 4]])
            .unwrap();
        index
            .insert_document_chunks(&second, &[vec![0.0; 4]])
            .unwrap();

        let ids: Vec<(i64, String)> = {
            let mut stmt = index
                .conn
                .prepare("SELECT id, document_id FROM chunks ORDER BY id")
                .unwrap();
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .unwrap()
                .collect::<Result<_>>()
                .unwrap()
        };

        assert_eq!(ids.len(), 2);
        assert!(ids[0].0 < ids[1].0);
        assert_eq!(ids[0].1, "a.txt");
        assert_eq!(ids[1].1, "b.txt");
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn test_insert_rejects_mismatched_lengths() {
        let mut index = open_test_index();
        let records = vec![ChunkRecord {
            document_id: "a.txt",
            position: 0,
            offset: 0,
            text: "alpha",
        }];
        let _ = index.insert_document_chunks(&records, &[]);
    }
}
