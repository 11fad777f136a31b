//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that turns query text into a vector for
//! semantic search, plus pure helpers for similarity and dimensionality
//! checks. Concrete providers (OpenAI-compatible, Ollama) live in the
//! `chunkseek` app crate.

use async_trait::async_trait;

use crate::error::{Result, RetrievalError};

/// Trait for embedding providers.
///
/// The vector returned by [`embed`](Embedder::embed) must have exactly
/// [`dims`](Embedder::dims) components and match the dimensionality of the
/// indexed vectors; see [`validate_dimensions`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one query string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Check that the embedder and the index agree on dimensionality.
///
/// Called once when the system is composed. A mismatch does not make k-NN
/// queries fail; it silently degrades them, so it is rejected up front.
/// An index that does not report its dimensionality is accepted.
pub fn validate_dimensions(embedder_dims: usize, store_dims: Option<usize>) -> Result<()> {
    match store_dims {
        Some(store) if store != embedder_dims => Err(RetrievalError::DimensionMismatch {
            embedder: embedder_dims,
            store,
        }),
        _ => Ok(()),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_dimension_check() {
        assert!(validate_dimensions(768, Some(768)).is_ok());
        assert!(validate_dimensions(768, None).is_ok());
        let err = validate_dimensions(768, Some(1024)).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                embedder: 768,
                store: 1024
            }
        ));
    }
}
