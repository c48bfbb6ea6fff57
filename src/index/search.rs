use super::{Index, serialize_vector};
use rusqlite::{Connection, Result, params};

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: i64,
    pub document_id: String,
    pub position: usize,
    pub text: String,
    /// Cosine similarity; higher is closer.
    pub similarity: f64,
}

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SearchResult> {
    let distance: f64 = row.get(4)?;
    // vec_distance_cosine returns cosine distance (1 - cos), so invert it
    // back to the similarity scale callers rank by.
    let similarity = 1.0 - distance;

    Ok(SearchResult {
        document_id: row.get(0)?,
        text: row.get(1)?,
        position: row.get::<_, i64>(2)? as usize,
        chunk_id: row.get(3)?,
        similarity,
    })
}

/// Perform vector similarity search using cosine distance.
///
/// Results come back ordered by descending similarity; exact ties are broken
/// by ascending chunk id so repeated queries see a stable order. `top_k == 0`
/// and an empty index both yield an empty vector, never an error.
pub fn knn_search(
    conn: &Connection,
    query_vector: &[f32],
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT
            c.document_id,
            c.content,
            c.position,
            c.id as chunk_id,
            vec_distance_cosine(v.embedding, ?) as distance
        FROM vec_chunks v
        JOIN chunks c ON v.rowid = c.id
        ORDER BY distance ASC, c.id ASC
        LIMIT ?
        "#,
    )?;

    let blob = serialize_vector(query_vector);
    let rows = stmt.query_map(params![blob, top_k as i64], map_search_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }

    Ok(results)
}

impl Index {
    /// Search this index directly; see [`knn_search`].
    pub fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        knn_search(&self.conn, query_vector, top_k)
    }
}
