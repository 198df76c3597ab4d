//! Core data models used throughout StudyBuddy.
//!
//! These types represent the documents, chunks, vectors, and flashcards that
//! flow through indexing, retrieval, and review scheduling.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to chunks and vectors.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Composite key shared by a [`Chunk`] and its [`EmbeddingVector`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub document_id: String,
    pub chunk_id: u32,
}

impl ChunkKey {
    pub fn new(document_id: impl Into<String>, chunk_id: u32) -> Self {
        Self {
            document_id: document_id.into(),
            chunk_id,
        }
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document_id, self.chunk_id)
    }
}

/// Uploaded study material that owns zero or more chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner: String,
    pub filename: String,
    /// Type tag supplied by the uploader (e.g. `"notes"`, `"textbook"`).
    pub kind: String,
    pub chunk_count: u32,
    pub indexed: bool,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// A contiguous slice of a document's text.
///
/// `start..end` is a half-open span measured in characters of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Position among emitted chunks, not among windows considered.
    pub chunk_id: u32,
    pub text: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(self.document_id.clone(), self.chunk_id)
    }
}

/// Embedding companion to a [`Chunk`], stored under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub key: ChunkKey,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One entry returned by a store scan: key, vector, chunk text, metadata.
///
/// `seq` is the store's insertion order for the key. It survives overwrites
/// and is the tie-break for equal similarity scores.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub key: ChunkKey,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
    pub seq: u64,
}

/// SM-2 scheduling state for a flashcard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
    /// Easiness factor, never below [`crate::scheduler::MIN_EASINESS`].
    pub easiness: f64,
    /// Interval in days, at least 1.
    pub interval: u32,
    pub repetitions: u32,
    pub due: NaiveDate,
}

impl ReviewState {
    /// State of a freshly created card: immediately due.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            easiness: 2.5,
            interval: 1,
            repetitions: 0,
            due: today,
        }
    }
}

/// A spaced-repetition flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub owner: String,
    pub front: String,
    pub back: String,
    /// Where the card came from (e.g. `"Quiz 3f2a91c0"`).
    pub source: String,
    #[serde(flatten)]
    pub state: ReviewState,
    /// Incremented on every write; used for compare-and-swap updates.
    pub version: u64,
}

/// Result of a successful review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOutcome {
    pub card_id: String,
    pub next_due: NaiveDate,
    pub interval_days: u32,
    pub quality: u8,
}
