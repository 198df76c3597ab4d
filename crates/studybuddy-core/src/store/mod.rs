//! Storage abstraction for StudyBuddy.
//!
//! Two repository traits split the persistent state:
//!
//! - [`VectorStore`] holds documents, their chunks, and one embedding per
//!   chunk, keyed by `(document_id, chunk_id)`.
//! - [`CardStore`] holds flashcards and offers a compare-and-swap update so a
//!   card's read-modify-write cycle can be made atomic.
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! SQLite implementation lives in the app crate; [`memory::InMemoryStore`]
//! serves tests and embedded use.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::{Card, Chunk, Document, EmbeddingVector, ReviewState, VectorRecord};

/// Document, chunk, and vector persistence.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](VectorStore::upsert_document) | Insert or update document metadata |
/// | [`delete_document`](VectorStore::delete_document) | Remove a document with its chunks and vectors |
/// | [`upsert_chunk`](VectorStore::upsert_chunk) | Store chunk text under its key |
/// | [`upsert_vector`](VectorStore::upsert_vector) | Store the embedding for a chunk key |
/// | [`scan`](VectorStore::scan) | All vectors, optionally scoped to an owner |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dimension every stored vector must have.
    fn dims(&self) -> usize;

    async fn upsert_document(&self, doc: &Document) -> Result<(), StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Documents in creation order, filtered to `owner` when given.
    async fn list_documents(&self, owner: Option<&str>) -> Result<Vec<Document>, StoreError>;

    /// Delete a document and cascade to its chunks and vectors.
    ///
    /// Returns `false` if no such document existed.
    async fn delete_document(&self, id: &str) -> Result<bool, StoreError>;

    /// Drop every chunk and vector of a document, keeping the document row.
    async fn clear_chunks(&self, document_id: &str) -> Result<(), StoreError>;

    /// Insert or overwrite a chunk. The owning document must exist.
    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<(), StoreError>;

    /// Chunks of one document ordered by chunk id.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, StoreError>;

    /// Insert or overwrite the vector for `vector.key`, alongside the chunk text.
    ///
    /// Rejects vectors whose length differs from [`dims`](VectorStore::dims).
    async fn upsert_vector(&self, vector: &EmbeddingVector, text: &str)
        -> Result<(), StoreError>;

    /// Every stored vector in `scope`, in insertion order.
    async fn scan(&self, scope: Scope<'_>) -> Result<Vec<VectorRecord>, StoreError>;

    /// Number of vectors [`scan`](VectorStore::scan) would return.
    async fn count_vectors(&self, scope: Scope<'_>) -> Result<usize, StoreError>;
}

/// Which stored entries a scan or search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    All,
    /// Documents uploaded by this user.
    Owner(&'a str),
    /// A single document.
    Document(&'a str),
}

impl<'a> From<Option<&'a str>> for Scope<'a> {
    fn from(owner: Option<&'a str>) -> Self {
        match owner {
            Some(o) => Scope::Owner(o),
            None => Scope::All,
        }
    }
}

/// Flashcard persistence.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Insert a new card. Returns `false`, leaving the stored card untouched,
    /// when a card with the same id already exists.
    async fn insert_card(&self, card: &Card) -> Result<bool, StoreError>;

    async fn get_card(&self, id: &str) -> Result<Option<Card>, StoreError>;

    /// Cards of `owner` with `due <= today`, ordered by due date ascending.
    /// Ties keep creation order.
    async fn due_cards(&self, owner: &str, today: NaiveDate) -> Result<Vec<Card>, StoreError>;

    /// Write `state` and bump the version iff the stored version still equals
    /// `expected_version`. Returns whether the write applied.
    async fn compare_and_swap(
        &self,
        card_id: &str,
        expected_version: u64,
        state: &ReviewState,
    ) -> Result<bool, StoreError>;
}

/// Reject a vector whose length differs from the store dimension.
pub fn check_dims(expected: usize, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}
