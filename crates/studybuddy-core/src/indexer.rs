//! Indexing pipeline: chunk → embed → store.
//!
//! [`Indexer::index_document`] is what the upload path calls once it has
//! plain text. Re-indexing a document replaces its previous chunks and
//! vectors. Store failures abort indexing; there is no safe fallback for
//! persistence.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::chunk::Chunker;
use crate::embedding::EmbeddingProvider;
use crate::error::{Error, StoreError};
use crate::models::{Document, EmbeddingVector, Metadata};
use crate::store::VectorStore;

/// Characters of chunk text kept in vector metadata.
const PREVIEW_CHARS: usize = 200;

/// Kind assigned to documents indexed without prior registration.
pub const DEFAULT_KIND: &str = "notes";

pub struct Indexer {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
        }
    }

    /// Record upload metadata for a document before it is indexed.
    ///
    /// Updating an existing document keeps its chunks; a document owned by
    /// someone else is rejected.
    pub async fn register_document(
        &self,
        id: &str,
        owner: &str,
        filename: &str,
        kind: &str,
    ) -> Result<Document, Error> {
        let doc = match self.owned_document(id, owner).await? {
            Some(existing) => Document {
                filename: filename.to_string(),
                kind: kind.to_string(),
                ..existing
            },
            None => new_document(id, owner, filename, kind),
        };
        self.store.upsert_document(&doc).await?;
        Ok(doc)
    }

    /// Chunk, embed, and store `text` as document `document_id` of `owner`.
    ///
    /// Returns the number of chunks indexed.
    pub async fn index_document(
        &self,
        document_id: &str,
        owner: &str,
        text: &str,
    ) -> Result<usize, Error> {
        let mut doc = match self.owned_document(document_id, owner).await? {
            Some(existing) => existing,
            None => new_document(document_id, owner, document_id, DEFAULT_KIND),
        };
        doc.indexed = false;
        doc.chunk_count = 0;
        self.store.upsert_document(&doc).await?;
        self.store.clear_chunks(document_id).await?;

        let chunks = self.chunker.chunk(document_id, text);
        for chunk in &chunks {
            let values = self.embedder.embed(&chunk.text).await?;
            self.store.upsert_chunk(chunk).await?;

            let mut metadata = Metadata::new();
            metadata.insert(
                "preview".to_string(),
                json!(chunk.text.chars().take(PREVIEW_CHARS).collect::<String>()),
            );
            let vector = EmbeddingVector {
                key: chunk.key(),
                values,
                metadata,
            };
            self.store.upsert_vector(&vector, &chunk.text).await?;
        }

        doc.chunk_count = chunks.len() as u32;
        doc.indexed = true;
        self.store.upsert_document(&doc).await?;

        info!(
            document_id,
            owner,
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "indexed document"
        );
        Ok(chunks.len())
    }

    /// Delete a document of `owner` together with its chunks and vectors.
    pub async fn delete_document(&self, owner: &str, document_id: &str) -> Result<(), Error> {
        if self.owned_document(document_id, owner).await?.is_none() {
            return Err(StoreError::UnknownDocument(document_id.to_string()).into());
        }
        self.store.delete_document(document_id).await?;
        info!(document_id, owner, "deleted document");
        Ok(())
    }

    async fn owned_document(&self, id: &str, owner: &str) -> Result<Option<Document>, Error> {
        match self.store.get_document(id).await? {
            Some(doc) if doc.owner != owner => Err(Error::OwnershipViolation {
                document_id: id.to_string(),
                owner: owner.to_string(),
            }),
            other => Ok(other),
        }
    }
}

fn new_document(id: &str, owner: &str, filename: &str, kind: &str) -> Document {
    Document {
        id: id.to_string(),
        owner: owner.to_string(),
        filename: filename.to_string(),
        kind: kind.to_string(),
        chunk_count: 0,
        indexed: false,
        created_at: chrono::Utc::now().timestamp(),
    }
}
