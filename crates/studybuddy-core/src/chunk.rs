//! Sliding-window text chunker.
//!
//! Splits document text into overlapping fixed-size windows. Window size and
//! overlap are measured in characters, so multi-byte text never splits inside
//! a code point.
//!
//! # Algorithm
//!
//! 1. `step = chunk_size - overlap` (validated `> 0` when the [`Chunker`] is built).
//! 2. Starting at cursor `0`, take the window `[cursor, cursor + chunk_size)`
//!    clipped to the text length.
//! 3. Emit it with the next sequential chunk id unless it is whitespace-only.
//! 4. Advance the cursor by `step` whether or not a chunk was emitted.
//! 5. Stop once `cursor >= len(text)`.
//!
//! # Example
//!
//! ```rust
//! use studybuddy_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 200).unwrap();
//! let text = "a".repeat(2500);
//! let chunks = chunker.chunk("doc-1", &text);
//! let starts: Vec<usize> = chunks.iter().map(|c| c.start).collect();
//! assert_eq!(starts, vec![0, 800, 1600, 2400]);
//! assert_eq!(chunks[3].end, 2500);
//! ```

use serde_json::json;

use crate::error::ChunkError;
use crate::models::{Chunk, Metadata};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Build a chunker, rejecting `overlap >= chunk_size` (the scan would
    /// never advance).
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkError> {
        if overlap >= chunk_size {
            return Err(ChunkError::InvalidConfig {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Split `text` into chunks owned by `document_id`.
    ///
    /// Chunk ids are contiguous from 0 in emission order. Empty or
    /// whitespace-only input yields no chunks.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let char_len = offsets.len();
        let byte_at = |c: usize| offsets.get(c).copied().unwrap_or(text.len());

        let mut chunks = Vec::new();
        let mut cursor = 0usize;
        let mut next_id: u32 = 0;

        while cursor < char_len {
            let end = (cursor + self.chunk_size).min(char_len);
            let window = &text[byte_at(cursor)..byte_at(end)];

            if !window.trim().is_empty() {
                chunks.push(make_chunk(document_id, next_id, window, cursor, end));
                next_id += 1;
            }

            cursor += self.step();
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// One-shot helper: validate parameters and chunk `text`.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkError> {
    Ok(Chunker::new(chunk_size, overlap)?.chunk(document_id, text))
}

fn make_chunk(document_id: &str, chunk_id: u32, text: &str, start: usize, end: usize) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert("start".to_string(), json!(start));
    metadata.insert("end".to_string(), json!(end));

    Chunk {
        document_id: document_id.to_string(),
        chunk_id,
        text: text.to_string(),
        start,
        end,
        metadata,
    }
}
