/// A contiguous slice of a document produced by the sliding window.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Ordinal of the chunk within its document, starting at 0.
    pub position: usize,
    /// Character offset of the chunk start within the document text.
    pub offset: usize,
    pub text: String,
}

/// Split text into overlapping chunks of at most `chunk_size` characters.
///
/// Consecutive chunks share `chunk_overlap` characters, so chunk `n + 1`
/// starts `chunk_size - chunk_overlap` characters after chunk `n`. Chunks are
/// never trimmed or rewritten: dropping the first `chunk_overlap` characters
/// of every chunk after the first and concatenating reproduces the document
/// text exactly. Offsets count `char`s, not bytes, so multi-byte scripts
/// never split inside a character.
///
/// The final chunk may be shorter than `chunk_size` but is always longer than
/// `chunk_overlap`.
pub fn sliding_window(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    assert!(chunk_size > 0, "chunk_size must be nonzero");
    assert!(
        chunk_overlap < chunk_size,
        "chunk_overlap must be smaller than chunk_size"
    );

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let stride = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut position = 0;
    let mut offset = 0;

    loop {
        let end = usize::min(offset + chunk_size, chars.len());
        chunks.push(TextChunk {
            position,
            offset,
            text: chars[offset..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        position += 1;
        offset += stride;
    }

    chunks
}
