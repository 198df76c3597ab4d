//! Nearest-neighbour lookup over stored vectors.
//!
//! [`VectorIndex`] is the seam between the retrieval engine and whatever
//! answers "which stored vectors are closest to this query". The only
//! implementation today is [`LinearScanIndex`], a full scan with cosine
//! similarity; an approximate index can replace it as long as it keeps the
//! same ordering rule:
//!
//! 1. score descending,
//! 2. ties by store insertion order (`seq`) ascending.
//!
//! [`merge_top_k`] applies the same rule when combining per-shard results,
//! so a sharded scan returns exactly what a single scan would.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{ChunkKey, VectorRecord};
use crate::store::{Scope, VectorStore};

/// A stored chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub key: ChunkKey,
    pub text: String,
    pub score: f32,
    /// Store insertion order, used as the tie-break.
    pub seq: u64,
}

/// Top-k similarity search over stored vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The `k` entries in `scope` most similar to `query`, ordered by score
    /// descending then insertion order.
    async fn search(
        &self,
        query: &[f32],
        scope: Scope<'_>,
        k: usize,
    ) -> Result<Vec<ScoredHit>, StoreError>;

    /// Number of searchable entries in `scope`.
    async fn len(&self, scope: Scope<'_>) -> Result<usize, StoreError>;
}

/// Brute-force index: scans every stored vector on each query.
pub struct LinearScanIndex {
    store: Arc<dyn VectorStore>,
}

impl LinearScanIndex {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VectorIndex for LinearScanIndex {
    async fn search(
        &self,
        query: &[f32],
        scope: Scope<'_>,
        k: usize,
    ) -> Result<Vec<ScoredHit>, StoreError> {
        if query.len() != self.store.dims() {
            return Err(StoreError::DimensionMismatch {
                expected: self.store.dims(),
                got: query.len(),
            });
        }
        let records = self.store.scan(scope).await?;
        Ok(rank(query, records, k))
    }

    async fn len(&self, scope: Scope<'_>) -> Result<usize, StoreError> {
        self.store.count_vectors(scope).await
    }
}

/// Score every record against `query` and keep the best `k`.
pub fn rank(query: &[f32], records: Vec<VectorRecord>, k: usize) -> Vec<ScoredHit> {
    let mut hits: Vec<ScoredHit> = records
        .into_iter()
        .map(|r| ScoredHit {
            score: cosine_similarity(query, &r.vector),
            key: r.key,
            text: r.text,
            seq: r.seq,
        })
        .collect();
    hits.sort_by(compare_hits);
    hits.truncate(k);
    hits
}

/// Merge per-shard top-k lists into one global top-k.
pub fn merge_top_k<I>(shards: I, k: usize) -> Vec<ScoredHit>
where
    I: IntoIterator<Item = Vec<ScoredHit>>,
{
    let mut all: Vec<ScoredHit> = shards.into_iter().flatten().collect();
    all.sort_by(compare_hits);
    all.truncate(k);
    all
}

fn compare_hits(a: &ScoredHit, b: &ScoredHit) -> Ordering {
    b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn record(doc: &str, id: u32, vector: Vec<f32>, seq: u64) -> VectorRecord {
        VectorRecord {
            key: ChunkKey::new(doc, id),
            vector,
            text: format!("{}-{}", doc, id),
            metadata: Metadata::new(),
            seq,
        }
    }

    #[test]
    fn test_rank_orders_by_score() {
        let records = vec![
            record("d", 0, vec![0.0, 1.0], 0),
            record("d", 1, vec![1.0, 0.0], 1),
            record("d", 2, vec![1.0, 1.0], 2),
        ];
        let hits = rank(&[1.0, 0.0], records, 10);
        let ids: Vec<u32> = hits.iter().map(|h| h.key.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let records = vec![
            record("b", 0, vec![2.0, 0.0], 5),
            record("a", 0, vec![1.0, 0.0], 3),
            record("c", 0, vec![3.0, 0.0], 9),
        ];
        let hits = rank(&[1.0, 0.0], records, 3);
        let seqs: Vec<u64> = hits.iter().map(|h| h.seq).collect();
        assert_eq!(seqs, vec![3, 5, 9]);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let records = (0..10)
            .map(|i| record("d", i, vec![1.0, i as f32], i as u64))
            .collect();
        assert_eq!(rank(&[1.0, 0.0], records, 3).len(), 3);
        assert!(rank(&[1.0, 0.0], Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_sharded_merge_matches_single_scan() {
        let records: Vec<VectorRecord> = (0..12)
            .map(|i| {
                let x = (i % 4) as f32;
                record("d", i, vec![1.0, x], i as u64)
            })
            .collect();
        let single = rank(&[1.0, 0.5], records.clone(), 5);

        let (even, odd): (Vec<VectorRecord>, Vec<VectorRecord>) =
            records.into_iter().partition(|r| r.seq % 2 == 0);
        let merged = merge_top_k(
            vec![rank(&[1.0, 0.5], odd, 5), rank(&[1.0, 0.5], even, 5)],
            5,
        );
        assert_eq!(single, merged);
    }
}
