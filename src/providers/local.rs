//! Local BERT-family embeddings via Candle
//!
//! Weights are fetched from the HuggingFace Hub on first use and cached by
//! hf-hub. Inference runs on the CPU inside `spawn_blocking`.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use crate::errors::{RagError, Result};
use crate::providers::{l2_normalize, EmbeddingProvider};

/// Default local model
pub const DEFAULT_LOCAL_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

const SERVICE: &str = "local-embedder";

fn model_error(context: &str, e: impl std::fmt::Display) -> RagError {
    RagError::external(SERVICE, format!("{}: {}", context, e))
}

struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BertEncoder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| model_error("Tokenization failed", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = encodings.len();

        let mut flat_ids = vec![0u32; batch_size * max_len];
        let mut flat_mask = vec![0u32; batch_size * max_len];
        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let offset = row * max_len;
            flat_ids[offset..offset + ids.len()].copy_from_slice(ids);
            flat_mask[offset..offset + mask.len()].copy_from_slice(mask);
        }

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)
            .map_err(|e| model_error("Failed to build input tensor", e))?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)
            .map_err(|e| model_error("Failed to build mask tensor", e))?;
        let token_type_ids = token_ids
            .zeros_like()
            .map_err(|e| model_error("Failed to build token types", e))?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| model_error("Forward pass failed", e))?;

        let pooled = mean_pool(&hidden, &attention_mask).map_err(|e| model_error("Pooling failed", e))?;
        let mut vectors = pooled
            .to_vec2::<f32>()
            .map_err(|e| model_error("Failed to read embeddings", e))?;

        for vector in vectors.iter_mut() {
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

/// Mean pooling over the sequence axis, weighted by the attention mask
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask
        .unsqueeze(2)?
        .expand(hidden.shape())?
        .to_dtype(hidden.dtype())?;

    let summed = (hidden * &mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

/// Embedding provider backed by a locally executed BERT model
#[derive(Clone)]
pub struct LocalEmbedder {
    encoder: Arc<BertEncoder>,
    model_id: String,
    dimension: usize,
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl LocalEmbedder {
    /// Load the default model
    pub fn new() -> Result<Self> {
        Self::load(DEFAULT_LOCAL_MODEL)
    }

    /// Download (if needed) and load a model by HuggingFace repo id
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| model_error("Failed to create HuggingFace API client", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| model_error("Failed to download model config", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| model_error("Failed to download tokenizer", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| model_error("Failed to download model weights", e))?;

        let config: Config = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;
        let dimension = config.hidden_size;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| model_error("Failed to load tokenizer", e))?;

        // SAFETY: the safetensors file is owned by the hf-hub cache and not mutated while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device) }
            .map_err(|e| model_error("Failed to load model weights", e))?;
        let model = BertModel::load(vb, &config).map_err(|e| model_error("Failed to create BERT model", e))?;

        info!(model = model_id, dimension, "local embedding model loaded");

        Ok(Self {
            encoder: Arc::new(BertEncoder {
                model,
                tokenizer,
                device,
            }),
            model_id: model_id.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encoder = Arc::clone(&self.encoder);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || encoder.encode(&texts))
            .await
            .map_err(|e| model_error("Embedding task failed", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_respects_mask() {
        let device = Device::Cpu;
        // batch 1, seq 2, hidden 2; second token is padding
        let hidden = Tensor::from_vec(vec![1.0f32, 3.0, 100.0, 100.0], (1, 2, 2), &device).unwrap();
        let mask = Tensor::from_vec(vec![1u32, 0], (1, 2), &device).unwrap();
        let pooled = mean_pool(&hidden, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(pooled, vec![vec![1.0, 3.0]]);
    }

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_embed_batch_dimension() {
        let embedder = LocalEmbedder::new().unwrap();
        let texts = vec!["Hello".to_string(), "World".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == embedder.dimension()));
    }
}
