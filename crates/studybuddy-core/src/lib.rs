//! # StudyBuddy Core
//!
//! Pure logic for StudyBuddy: data models, sliding-window chunking, the
//! embedding provider trait with its deterministic fallback, store traits
//! with an in-memory implementation, vector retrieval with a keyword
//! fallback, and the SM-2 review scheduler.
//!
//! This crate contains no SQL, HTTP, or filesystem access. The application
//! crate supplies concrete stores and embedding providers and injects them
//! into [`retrieval::RetrievalEngine`], [`indexer::Indexer`], and
//! [`scheduler::Scheduler`].

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod indexer;
pub mod models;
pub mod retrieval;
pub mod scheduler;
pub mod store;

pub use error::{
    ChunkError, Error, ProviderError, RetrievalError, ReviewError, StoreError, VectorSearchError,
};
