//! Metadata extraction
//!
//! Derives structured attributes from chunk text so queries can filter on
//! them. Extracted values live under the `extracted` key of a chunk's
//! metadata, e.g. `extracted.keywords = ["rust", "tokio"]`.

pub mod keywords;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Chunk, Metadata};

pub use keywords::{normalize_keywords, LlmKeywordExtractor};

/// Key under which derived attributes are stored
pub const EXTRACTED_KEY: &str = "extracted";

/// Where keyword lists come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordSource {
    /// Term frequency over the chunk text
    #[default]
    Local,
    /// Completion model via [`LlmKeywordExtractor`]
    Llm,
}

/// Which derived attributes to compute per chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Extract a keyword list
    #[serde(default)]
    pub keywords: bool,
    /// Upper bound on keywords per chunk
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
    #[serde(default)]
    pub source: KeywordSource,
}

fn default_max_keywords() -> usize {
    5
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            keywords: false,
            max_keywords: default_max_keywords(),
            source: KeywordSource::Local,
        }
    }
}

impl ExtractConfig {
    /// True when keywords should be computed locally
    pub fn local_keywords(&self) -> bool {
        self.keywords && self.source == KeywordSource::Local
    }
}

/// Local, deterministic metadata extractor
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor {
    config: ExtractConfig,
}

impl MetadataExtractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Derive attributes for one chunk
    pub fn extract(&self, chunk: &Chunk) -> Metadata {
        let mut derived = Metadata::new();
        if self.config.local_keywords() {
            let terms = keywords::top_terms(chunk.body(), self.config.max_keywords);
            derived.insert("keywords".to_string(), Value::from(terms));
        }
        derived
    }

    /// Merge derived attributes into every chunk in place
    pub fn apply(&self, chunks: &mut [Chunk]) {
        if !self.config.local_keywords() {
            return;
        }
        for chunk in chunks.iter_mut() {
            let derived = self.extract(chunk);
            merge_extracted(&mut chunk.metadata, derived);
        }
    }
}

/// Merge `derived` into `metadata[EXTRACTED_KEY]`, overwriting existing keys
pub fn merge_extracted(metadata: &mut Metadata, derived: Metadata) {
    if derived.is_empty() {
        return;
    }
    let slot = metadata
        .entry(EXTRACTED_KEY.to_string())
        .or_insert_with(|| Value::Object(Metadata::new()));
    if !slot.is_object() {
        *slot = Value::Object(Metadata::new());
    }
    if let Value::Object(existing) = slot {
        existing.extend(derived);
    }
}
