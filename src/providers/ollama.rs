//! Ollama HTTP client
//!
//! Implements both provider capabilities against a running Ollama server:
//! - Completion: POST /api/generate (non-streaming)
//! - Embeddings: POST /api/embed (batched input)

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::providers::{EmbeddingProvider, TextCompletionProvider};
use crate::types::PipelineStep;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "qwen2.5:7b-instruct";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Dimension of the default embedding model
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Default request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SERVICE: &str = "ollama";

/// Ollama client for completions and embeddings
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    completion_model: String,
    embedding_model: String,
    embedding_dim: usize,
}

impl OllamaClient {
    /// Create Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(
            DEFAULT_OLLAMA_URL,
            DEFAULT_COMPLETION_MODEL,
            DEFAULT_EMBEDDING_MODEL,
            DEFAULT_EMBEDDING_DIM,
        )
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(
        base_url: &str,
        completion_model: &str,
        embedding_model: &str,
        embedding_dim: usize,
    ) -> Result<Self> {
        Self::with_timeout(base_url, completion_model, embedding_model, embedding_dim, REQUEST_TIMEOUT)
    }

    /// Create Ollama client with an explicit request timeout
    pub fn with_timeout(
        base_url: &str,
        completion_model: &str,
        embedding_model: &str,
        embedding_dim: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            completion_model: completion_model.to_string(),
            embedding_model: embedding_model.to_string(),
            embedding_dim,
        })
    }

    /// Generate a complete (non-streamed) response
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.completion_model,
            prompt,
            stream: false,
            options: None,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::external(SERVICE, format!("Failed to send request: {}", e)))?;

        let response = Self::check_status(response).await?;
        let body: GenerateResponse = decode(PipelineStep::Synthesize, &response.text().await?)?;

        debug!(model = %self.completion_model, chars = body.response.len(), "completion received");
        Ok(body.response)
    }

    /// Embed a batch of texts in one request
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::external(SERVICE, format!("Failed to send request: {}", e)))?;

        let response = Self::check_status(response).await?;
        let body: EmbedResponse = decode(PipelineStep::Embed, &response.text().await?)?;

        debug!(model = %self.embedding_model, count = body.embeddings.len(), "embeddings received");
        Ok(body.embeddings)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(RagError::external(SERVICE, format!("HTTP {}: {}", status, error_text)))
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RagError::external(SERVICE, format!("Failed to list models: {}", e)))?;

        let response = Self::check_status(response).await?;
        let models_response: ModelsResponse = serde_json::from_str(&response.text().await?)?;

        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }

    /// Completion model name
    pub fn completion_model(&self) -> &str {
        &self.completion_model
    }

    /// Embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextCompletionProvider for OllamaClient {
    fn model_id(&self) -> &str {
        &self.completion_model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt).await
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> usize {
        self.embedding_dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts).await
    }
}

/// Parse a response body; a readable but unexpected body is an integration
/// error for the step that requested it
fn decode<T: DeserializeOwned>(step: PipelineStep, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| RagError::integration(step, None, format!("unreadable {} response: {}", SERVICE, e)))
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

/// Ollama generate response (non-streaming)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama embed request
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Ollama embed response
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}
