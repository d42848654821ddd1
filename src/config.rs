//! Configuration management for metarag
//!
//! TOML file with defaults and validation.
//! Location: ~/.metarag/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::chunking::ChunkConfig;
use crate::cleaning::DEFAULT_INSTRUCTIONS;
use crate::errors::{RagError, Result};
use crate::filter::MetadataSchema;
use crate::pipeline::PipelineConfig;
use crate::planner::{ContextConfig, FilterMode, PlannerConfig, DEFAULT_TOP_K};
use crate::providers::local::DEFAULT_LOCAL_MODEL;
use crate::providers::ollama::{DEFAULT_COMPLETION_MODEL, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL};
use crate::store::qdrant::DEFAULT_QDRANT_URL;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaragConfig {
    pub chunking: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub cleaning: CleaningConfig,
    pub ollama: OllamaConfig,
    pub embedding: EmbeddingConfig,
    pub qdrant: QdrantConfig,
}

/// Where vectors live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    /// Process-local; contents are lost on exit
    Memory,
}

/// Index and query settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub index: String,
    pub dimension: usize,
    pub top_k: usize,
    pub enable_filter: bool,
    pub filter_mode: FilterMode,
    pub backend: StoreBackend,
    pub schema: MetadataSchema,
    pub context: ContextConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index: "metarag".to_string(),
            dimension: DEFAULT_EMBEDDING_DIM,
            top_k: DEFAULT_TOP_K,
            enable_filter: true,
            filter_mode: FilterMode::Rules,
            backend: StoreBackend::Qdrant,
            schema: MetadataSchema::new(),
            context: ContextConfig::default(),
        }
    }
}

/// LLM cleaning pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub enabled: bool,
    pub instructions: String,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }
}

/// Ollama connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub completion_model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

/// Embedding backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    #[default]
    Ollama,
    /// candle BERT model from the Hugging Face hub
    Local,
    /// Feature hashing, no model required
    Hashing,
}

impl EmbedderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Local => "local",
            Self::Hashing => "hashing",
        }
    }
}

impl std::str::FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "local" => Ok(Self::Local),
            "hashing" => Ok(Self::Hashing),
            other => Err(RagError::Config(format!(
                "unknown embedder '{}' (expected ollama, local or hashing)",
                other
            ))),
        }
    }
}

/// Embedding provider selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbedderKind,
    /// Vector dimension the provider produces
    pub dimension: usize,
    pub local_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderKind::Ollama,
            dimension: DEFAULT_EMBEDDING_DIM,
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
        }
    }
}

/// Qdrant connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: String,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
        }
    }
}

impl MetaragConfig {
    /// Load from an explicit file, or the default location, or built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: MetaragConfig = toml::from_str(&contents)
            .map_err(|e| RagError::Config(format!("Failed to parse config {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(MetaragConfig::default())
    }

    /// `~/.metarag/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".metarag").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.retrieval.index.trim().is_empty() {
            return Err(RagError::Config("retrieval.index must not be empty".to_string()));
        }
        if self.retrieval.dimension == 0 {
            return Err(RagError::Config("retrieval.dimension must be greater than 0".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be greater than 0".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding.dimension must be greater than 0".to_string()));
        }
        if self.embedding.dimension != self.retrieval.dimension {
            return Err(RagError::Config(format!(
                "embedding.dimension ({}) must equal retrieval.dimension ({})",
                self.embedding.dimension, self.retrieval.dimension
            )));
        }
        if self.cleaning.enabled && self.cleaning.instructions.trim().is_empty() {
            return Err(RagError::Config("cleaning.instructions must not be empty".to_string()));
        }

        Ok(())
    }

    /// Write pretty TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RagError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| RagError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            index: self.retrieval.index.clone(),
            dimension: self.retrieval.dimension,
            chunking: self.chunking.clone(),
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            index: self.retrieval.index.clone(),
            top_k: self.retrieval.top_k,
            enable_filter: self.retrieval.enable_filter,
            filter_mode: self.retrieval.filter_mode,
            schema: self.retrieval.schema.clone(),
            context: self.retrieval.context.clone(),
        }
    }
}
