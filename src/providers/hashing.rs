//! Deterministic feature-hashing embedder
//!
//! Maps each lower-cased word to a bucket with a stable FNV-1a hash and
//! counts occurrences, then L2-normalizes. Texts sharing vocabulary end up
//! close under cosine similarity, which is enough for offline runs and tests.

use async_trait::async_trait;

use crate::errors::{RagError, Result};
use crate::providers::{l2_normalize, EmbeddingProvider};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

/// Bag-of-words hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("hashing-d{}", dimension),
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = (fnv1a(word.to_lowercase().as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.dimension == 0 {
            return Err(RagError::Config("embedding dimension must be greater than 0".to_string()));
        }
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashingEmbedder::new(64);
        assert_eq!(embedder.embed_text("Hello World"), embedder.embed_text("hello world"));
    }

    #[test]
    fn test_unit_length() {
        let v = HashingEmbedder::new(32).embed_text("some words here");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_text("temperature sensor");
        let related = embedder.embed_text("the temperature sensor reading");
        let unrelated = embedder.embed_text("banana bread recipe");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_batch_alignment() {
        let embedder = HashingEmbedder::new(16);
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 16));
    }

    #[tokio::test]
    async fn test_zero_dimension_rejected() {
        let embedder = HashingEmbedder::new(0);
        assert!(embedder.embed_batch(&["a".to_string()]).await.is_err());
    }
}
