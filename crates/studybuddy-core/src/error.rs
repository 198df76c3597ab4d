//! Error types for StudyBuddy core operations.

use thiserror::Error;

/// Umbrella error for callers that drive several core components.
#[derive(Error, Debug)]
pub enum Error {
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    #[error("embedding error: {0}")]
    Embedding(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("review error: {0}")]
    Review(#[from] ReviewError),

    /// Document exists but belongs to another user.
    #[error("document {document_id} is not owned by {owner}")]
    OwnershipViolation { document_id: String, owner: String },
}

/// Chunking errors. Raised before any chunk is produced.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunking configuration: overlap {overlap} must be smaller than chunk_size {chunk_size}")]
    InvalidConfig { chunk_size: usize, overlap: usize },
}

/// Embedding provider errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport failure or retryable status (429, 5xx).
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Non-retryable response (4xx other than 429).
    #[error("provider rejected request: {0}")]
    Rejected(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider returned {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Vector / card store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Persistence layer unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("vector has {got} dimensions, store holds {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("unknown document: {0}")]
    UnknownDocument(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Why the vector path of retrieval could not answer. The retrieval engine
/// turns either case into a keyword search.
#[derive(Error, Debug)]
pub enum VectorSearchError {
    #[error("query embedding failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("vector index failed: {0}")]
    Store(#[from] StoreError),
}

/// Retrieval errors. The unscoped and owner-scoped paths never return these;
/// only document-scoped retrieval rejects a request.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("document {document_id} is not owned by {owner}")]
    OwnershipViolation { document_id: String, owner: String },

    #[error("unknown document: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Review scheduler errors.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("card not found: {0}")]
    NotFound(String),

    #[error("card {card_id} is not owned by {owner}")]
    OwnershipViolation { card_id: String, owner: String },

    #[error("quality must be in 0..=5, got {0}")]
    InvalidQuality(u8),

    /// The compare-and-swap lost too many consecutive races.
    #[error("card {0} is under heavy concurrent review, giving up")]
    Contention(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
