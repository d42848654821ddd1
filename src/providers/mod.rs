//! External capability interfaces
//!
//! The pipeline never talks to a model directly. It depends on two narrow
//! traits so that real providers (Ollama, a local BERT model) and
//! deterministic stand-ins can be swapped freely.

pub mod hashing;
pub mod local;
pub mod ollama;

use async_trait::async_trait;

use crate::errors::{RagError, Result};
use crate::types::PipelineStep;

pub use hashing::HashingEmbedder;
pub use local::LocalEmbedder;
pub use ollama::OllamaClient;

/// Maps text to fixed-length vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier
    fn model_id(&self) -> &str;

    /// Vector dimension produced by this model
    fn dimension(&self) -> usize;

    /// Embed texts; output is positionally aligned with input
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (queries)
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(RagError::integration(
                PipelineStep::Embed,
                None,
                format!("expected 1 vector for query, got {}", vectors.len()),
            ));
        }
        Ok(vectors.remove(0))
    }
}

/// Generates text from a prompt
#[async_trait]
pub trait TextCompletionProvider: Send + Sync {
    /// Model identifier
    fn model_id(&self) -> &str;

    /// Complete the prompt and return the full response text
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Scale a vector to unit length in place (no-op for the zero vector)
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
