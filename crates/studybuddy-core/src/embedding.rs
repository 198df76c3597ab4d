//! Embedding provider trait, deterministic fallback vectors, and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the hash-based [`MockProvider`] used when no external service
//! is reachable, and pure helpers for similarity and BLOB serialization.
//!
//! Network-backed providers and the retry/fallback wrapper live in the
//! `studybuddy` app crate.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;

/// Reference embedding dimensionality (`text-embedding-3-small`).
pub const DEFAULT_DIMS: usize = 1536;

/// Trait for embedding providers.
///
/// Implementations are constructed by the application and injected into the
/// indexer and retrieval engine, so tests can substitute deterministic fakes.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text into a vector of exactly [`dims`](Self::dims) components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Deterministic provider backed by [`mock_embedding`].
///
/// Never fails. Used when no external service is configured and as the
/// fallback once a real provider has exhausted its retries.
#[derive(Debug, Clone)]
pub struct MockProvider {
    dims: usize,
}

impl MockProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn model_name(&self) -> &str {
        "mock-sha256"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(mock_embedding(text, self.dims))
    }
}

/// Hash-derived unit vector for `text`.
///
/// Component `i` is `SHA-256(text ‖ decimal(i))`, whose leading 8 bytes are read
/// as a big-endian `u64`, scaled to `[0, 1)` and mapped to `[-1, 1)`. The
/// vector is then L2-normalized. Same text, same vector.
pub fn mock_embedding(text: &str, dims: usize) -> Vec<f32> {
    let seed = text.as_bytes();
    let raw: Vec<f64> = (0..dims)
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(i.to_string().as_bytes());
            let digest = hasher.finalize();
            let mut lead = [0u8; 8];
            lead.copy_from_slice(&digest[..8]);
            let unit = u64::from_be_bytes(lead) as f64 / 2f64.powi(64);
            unit * 2.0 - 1.0
        })
        .collect();

    let magnitude = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
    if magnitude == 0.0 {
        return raw.into_iter().map(|v| v as f32).collect();
    }
    raw.into_iter().map(|v| (v / magnitude) as f32).collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal, or either vector has zero norm
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths. Never
/// returns NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    if sim.is_nan() {
        return 0.0;
    }
    sim.clamp(-1.0, 1.0) as f32
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use studybuddy_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a whole `f32`
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
