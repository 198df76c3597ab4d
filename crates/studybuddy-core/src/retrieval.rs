//! Retrieval engine: vector search with an explicit keyword fallback.
//!
//! The engine embeds the query, asks the [`VectorIndex`] for the best `k`
//! chunks, and returns them with their cosine similarity. When the vector
//! path cannot answer, it degrades to keyword overlap instead of failing:
//!
//! | Condition | Path taken |
//! |-----------|------------|
//! | no stored vectors in scope | keyword, without embedding the query |
//! | vector count unavailable | keyword |
//! | embedding provider error | keyword |
//! | index/store error during search | keyword |
//! | vector search returned nothing | keyword |
//!
//! The keyword path scores each chunk as
//! `|query terms ∩ chunk terms| / |query terms|` over case-insensitive
//! whitespace tokens and drops zero scores. It never raises: an empty result
//! means no relevant material.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{RetrievalError, StoreError, VectorSearchError};
use crate::index::{LinearScanIndex, VectorIndex};
use crate::models::Document;
use crate::store::{Scope, VectorStore};

/// Default number of chunks returned to generation collaborators.
pub const DEFAULT_TOP_K: usize = 5;

/// Which path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPath {
    Vector,
    Keyword,
}

/// One retrieved chunk: `(text, score, document_id)` plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub document_id: String,
    pub chunk_id: u32,
    pub path: RetrievalPath,
}

/// Ranks stored chunks against a query.
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn VectorStore>,
}

impl RetrievalEngine {
    /// Engine over a linear-scan index of `store`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        let index = Arc::new(LinearScanIndex::new(store.clone()));
        Self::with_index(embedder, index, store)
    }

    /// Engine with a caller-supplied index. `store` still serves the keyword
    /// fallback.
    pub fn with_index(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
        }
    }

    /// Top `k` chunks for `query`, across all documents or only `owner`'s.
    ///
    /// Results are sorted by non-increasing score and never exceed `k`.
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        owner: Option<&str>,
        k: usize,
    ) -> Vec<RetrievedChunk> {
        self.retrieve(query, owner.into(), k).await
    }

    /// Top `k` chunks for `query` within one document owned by `owner`.
    pub async fn retrieve_in_document(
        &self,
        owner: &str,
        document_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let doc = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| RetrievalError::NotFound(document_id.to_string()))?;
        if doc.owner != owner {
            return Err(RetrievalError::OwnershipViolation {
                document_id: document_id.to_string(),
                owner: owner.to_string(),
            });
        }
        Ok(self.retrieve(query, Scope::Document(document_id), k).await)
    }

    async fn retrieve(&self, query: &str, scope: Scope<'_>, k: usize) -> Vec<RetrievedChunk> {
        if k == 0 {
            return Vec::new();
        }

        match self.vector_search(query, scope, k).await {
            Ok(results) if !results.is_empty() => results,
            Ok(_) => {
                warn!(?scope, "no vector matches, using keyword search");
                self.keyword_search(query, scope, k).await
            }
            Err(reason) => {
                warn!(?scope, %reason, "vector search unavailable, using keyword search");
                self.keyword_search(query, scope, k).await
            }
        }
    }

    async fn vector_search(
        &self,
        query: &str,
        scope: Scope<'_>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, VectorSearchError> {
        let stored = self.index.len(scope).await?;
        if stored == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vec, scope, k).await?;

        debug!(candidates = stored, returned = hits.len(), "vector search");
        Ok(hits
            .into_iter()
            .map(|h| RetrievedChunk {
                text: h.text,
                score: h.score,
                document_id: h.key.document_id,
                chunk_id: h.key.chunk_id,
                path: RetrievalPath::Vector,
            })
            .collect())
    }

    /// Keyword-overlap search over the chunks of every document in `scope`.
    ///
    /// Store failures are logged and treated as "no material".
    pub async fn keyword_search(
        &self,
        query: &str,
        scope: Scope<'_>,
        k: usize,
    ) -> Vec<RetrievedChunk> {
        let query_terms = terms(query);
        if query_terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let docs = match self.documents_in(scope).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "keyword search could not list documents");
                return Vec::new();
            }
        };

        let mut results = Vec::new();
        for doc in docs {
            let chunks = match self.store.chunks_for_document(&doc.id).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(document_id = %doc.id, error = %e, "skipping document in keyword search");
                    continue;
                }
            };
            for chunk in chunks {
                let score = keyword_score(&query_terms, &chunk.text);
                if score > 0.0 {
                    results.push(RetrievedChunk {
                        text: chunk.text,
                        score,
                        document_id: chunk.document_id,
                        chunk_id: chunk.chunk_id,
                        path: RetrievalPath::Keyword,
                    });
                }
            }
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        results
    }

    async fn documents_in(&self, scope: Scope<'_>) -> Result<Vec<Document>, StoreError> {
        match scope {
            Scope::All => self.store.list_documents(None).await,
            Scope::Owner(owner) => self.store.list_documents(Some(owner)).await,
            Scope::Document(id) => Ok(self.store.get_document(id).await?.into_iter().collect()),
        }
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Fraction of distinct query terms present in `text`.
fn keyword_score(query_terms: &HashSet<String>, text: &str) -> f32 {
    let chunk_terms = terms(text);
    let matches = query_terms
        .iter()
        .filter(|t| chunk_terms.contains(*t))
        .count();
    matches as f32 / query_terms.len() as f32
}

/// A numbered citation for a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source_id: usize,
    pub text: String,
    pub similarity: f64,
    pub document_id: String,
}

/// Render retrieved chunks as `[Source N]: text` blocks for a prompt,
/// truncating each to `max_chars` characters.
pub fn format_context(results: &[RetrievedChunk], max_chars: usize) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[Source {}]: {}", i + 1, truncate_chars(&r.text, max_chars)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Citations matching the numbering of [`format_context`].
pub fn citations(results: &[RetrievedChunk]) -> Vec<Citation> {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| Citation {
            source_id: i + 1,
            text: truncate_chars(&r.text, 200),
            similarity: (r.score as f64 * 1000.0).round() / 1000.0,
            document_id: r.document_id.clone(),
        })
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
