//! In-memory [`VectorStore`] and [`CardStore`] implementation.
//!
//! Everything sits behind one `std::sync::RwLock`, so each method is atomic
//! with respect to the others. A poisoned lock is reported as
//! [`StoreError::Unavailable`].

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::{
    Card, Chunk, ChunkKey, Document, EmbeddingVector, Metadata, ReviewState, VectorRecord,
};

use super::{check_dims, CardStore, Scope, VectorStore};

struct StoredVector {
    key: ChunkKey,
    values: Vec<f32>,
    text: String,
    metadata: Metadata,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    docs: Vec<Document>,
    chunks: BTreeMap<ChunkKey, Chunk>,
    vectors: Vec<StoredVector>,
    next_seq: u64,
    cards: Vec<Card>,
}

impl Inner {
    fn owner_of(&self, document_id: &str) -> Option<&str> {
        self.docs
            .iter()
            .find(|d| d.id == document_id)
            .map(|d| d.owner.as_str())
    }

    fn in_scope(&self, document_id: &str, scope: Scope<'_>) -> bool {
        match scope {
            Scope::All => true,
            Scope::Owner(o) => self.owner_of(document_id) == Some(o),
            Scope::Document(id) => document_id == id,
        }
    }
}

/// In-memory store for tests and single-process use.
pub struct InMemoryStore {
    dims: usize,
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert_document(&self, doc: &Document) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        match inner.docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc.clone(),
            None => inner.docs.push(doc.clone()),
        }
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let inner = self.read()?;
        Ok(inner.docs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, owner: Option<&str>) -> Result<Vec<Document>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .docs
            .iter()
            .filter(|d| owner.map_or(true, |o| d.owner == o))
            .cloned()
            .collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        let before = inner.docs.len();
        inner.docs.retain(|d| d.id != id);
        if inner.docs.len() == before {
            return Ok(false);
        }
        inner.chunks.retain(|k, _| k.document_id != id);
        inner.vectors.retain(|v| v.key.document_id != id);
        Ok(true)
    }

    async fn clear_chunks(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.chunks.retain(|k, _| k.document_id != document_id);
        inner.vectors.retain(|v| v.key.document_id != document_id);
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        if inner.owner_of(&chunk.document_id).is_none() {
            return Err(StoreError::UnknownDocument(chunk.document_id.clone()));
        }
        inner.chunks.insert(chunk.key(), chunk.clone());
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn upsert_vector(
        &self,
        vector: &EmbeddingVector,
        text: &str,
    ) -> Result<(), StoreError> {
        check_dims(self.dims, &vector.values)?;
        let mut inner = self.write()?;
        if inner.owner_of(&vector.key.document_id).is_none() {
            return Err(StoreError::UnknownDocument(vector.key.document_id.clone()));
        }

        if let Some(existing) = inner.vectors.iter_mut().find(|v| v.key == vector.key) {
            existing.values = vector.values.clone();
            existing.text = text.to_string();
            existing.metadata = vector.metadata.clone();
            return Ok(());
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.vectors.push(StoredVector {
            key: vector.key.clone(),
            values: vector.values.clone(),
            text: text.to_string(),
            metadata: vector.metadata.clone(),
            seq,
        });
        Ok(())
    }

    async fn scan(&self, scope: Scope<'_>) -> Result<Vec<VectorRecord>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .vectors
            .iter()
            .filter(|v| inner.in_scope(&v.key.document_id, scope))
            .map(|v| VectorRecord {
                key: v.key.clone(),
                vector: v.values.clone(),
                text: v.text.clone(),
                metadata: v.metadata.clone(),
                seq: v.seq,
            })
            .collect())
    }

    async fn count_vectors(&self, scope: Scope<'_>) -> Result<usize, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .vectors
            .iter()
            .filter(|v| inner.in_scope(&v.key.document_id, scope))
            .count())
    }
}

#[async_trait]
impl CardStore for InMemoryStore {
    async fn insert_card(&self, card: &Card) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        if inner.cards.iter().any(|c| c.id == card.id) {
            return Ok(false);
        }
        inner.cards.push(card.clone());
        Ok(true)
    }

    async fn get_card(&self, id: &str) -> Result<Option<Card>, StoreError> {
        let inner = self.read()?;
        Ok(inner.cards.iter().find(|c| c.id == id).cloned())
    }

    async fn due_cards(&self, owner: &str, today: NaiveDate) -> Result<Vec<Card>, StoreError> {
        let inner = self.read()?;
        let mut due: Vec<Card> = inner
            .cards
            .iter()
            .filter(|c| c.owner == owner && c.state.due <= today)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.state.due);
        Ok(due)
    }

    async fn compare_and_swap(
        &self,
        card_id: &str,
        expected_version: u64,
        state: &ReviewState,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        match inner.cards.iter_mut().find(|c| c.id == card_id) {
            Some(card) if card.version == expected_version => {
                card.state = *state;
                card.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
