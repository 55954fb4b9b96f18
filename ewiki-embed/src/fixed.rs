//! Deterministic offline embedding provider.
//!
//! [`FixedEmbeddingProvider`] hashes each whitespace-separated token into one of
//! `dimension` buckets (feature hashing) and returns the bucket counts, signed by
//! a second hash bit. Texts that share words therefore score higher under cosine
//! similarity than texts that do not, which is enough for smoke runs, demos and
//! tests that must not touch the network. It is not a semantic model.

use crate::config::DEFAULT_MAX_INPUT_CHARS;
use crate::error::{GatewayError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, truncate_to_chars};
use async_trait::async_trait;
use fnv::FnvHasher;
use std::hash::Hasher;

/// Hash-based embedding provider with a fixed output dimension
#[derive(Debug, Clone)]
pub struct FixedEmbeddingProvider {
    dimension: usize,
    max_batch_size: usize,
    max_input_chars: usize,
}

impl FixedEmbeddingProvider {
    /// Creates a provider producing vectors of `dimension` components.
    ///
    /// # Errors
    /// [`GatewayError::InvalidConfig`] if `dimension` is zero.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(GatewayError::invalid_config(
                "embedding dimension must be greater than zero",
            ));
        }
        Ok(Self {
            dimension,
            max_batch_size: usize::MAX,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        })
    }

    /// Limit the number of texts per call (builder style)
    pub fn with_max_batch_size(self, max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            ..self
        }
    }

    /// Set the per-text character cap (builder style)
    pub fn with_max_input_chars(self, max_input_chars: usize) -> Self {
        Self {
            max_input_chars,
            ..self
        }
    }

    /// Output dimension of every vector
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in truncate_to_chars(text, self.max_input_chars).split_whitespace() {
            let mut hasher = FnvHasher::default();
            hasher.write(token.to_lowercase().as_bytes());
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.len() > self.max_batch_size {
            return Err(GatewayError::BatchTooLarge {
                size: texts.len(),
                max: self.max_batch_size,
            });
        }
        let embeddings: Vec<Vec<f32>> = texts.iter().map(|t| self.embed_one(t)).collect();
        Ok(EmbeddingResult {
            embeddings,
            dimension: self.dimension,
        })
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn provider_name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[tokio::test]
    async fn test_fixed_embeddings_are_deterministic() -> Result<()> {
        let provider = FixedEmbeddingProvider::new(64)?;
        let texts = vec!["fn parse_config()".to_string(), "struct Index".to_string()];

        let first = provider.embed_texts(&texts).await?;
        let second = provider.embed_texts(&texts).await?;
        assert_eq!(first, second);
        assert_eq!(first.dimension, 64);
        assert!(first.check_shape(2).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_shared_tokens_score_higher() -> Result<()> {
        let provider = FixedEmbeddingProvider::new(256)?;
        let query = provider.embed_text("load the vector index").await?;
        let related = provider.embed_text("save and load the vector index to disk").await?;
        let unrelated = provider.embed_text("render button colours").await?;

        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() -> Result<()> {
        let provider = FixedEmbeddingProvider::new(8)?;
        let vector = provider.embed_text("   ").await?;
        assert!(vector.iter().all(|&x| x == 0.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_limit_is_enforced() {
        let provider = FixedEmbeddingProvider::new(8).unwrap().with_max_batch_size(1);
        let texts = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(
            provider.embed_texts(&texts).await,
            Err(GatewayError::BatchTooLarge { size: 2, max: 1 })
        ));
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        assert!(FixedEmbeddingProvider::new(0).is_err());
    }
}
