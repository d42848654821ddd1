//! Document chunking
//!
//! Splits a [`Document`] into overlapping [`Chunk`]s. Lengths are measured in
//! chars and every chunk is a contiguous slice of the source text, so the
//! original can always be rebuilt with [`reconstruct`].
//!
//! Strategies:
//! - `recursive`: split on the configured separator, then on progressively
//!   finer separators, then into grapheme windows; adjacent small segments are
//!   packed back together up to the size limit
//! - `fixed`: grapheme windows only

pub mod recursive;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RagError, Result};
use crate::metadata::ExtractConfig;
use crate::types::{Chunk, Document};
use recursive::{assign_overlap, pack_segments, Span};

/// Separators tried after the configured one, coarsest first
pub const FALLBACK_SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chunking algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Recursive,
    Fixed,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recursive => "recursive",
            Self::Fixed => "fixed",
        }
    }
}

/// Chunking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub strategy: ChunkStrategy,
    /// Maximum chars per chunk
    pub size: usize,
    /// Chars shared between consecutive chunks
    pub overlap: usize,
    /// Preferred split boundary
    pub separator: String,
    /// Derived metadata requests
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Recursive,
            size: 512,
            overlap: 50,
            separator: "\n".to_string(),
            extract: ExtractConfig::default(),
        }
    }
}

impl ChunkConfig {
    /// Check size/overlap/separator constraints
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(RagError::Config("chunk size must be greater than 0".to_string()));
        }
        if self.overlap >= self.size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                self.overlap, self.size
            )));
        }
        if self.separator.is_empty() {
            return Err(RagError::Config("chunk separator must not be empty".to_string()));
        }
        Ok(())
    }

    /// Separator hierarchy for the recursive strategy
    pub fn separators(&self) -> Vec<String> {
        let mut separators = vec![self.separator.clone()];
        for fallback in FALLBACK_SEPARATORS {
            if !separators.iter().any(|s| s == fallback) {
                separators.push(fallback.to_string());
            }
        }
        separators
    }
}

/// Validated chunker for one configuration
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
    separators: Vec<String>,
}

impl Chunker {
    /// Create a chunker, failing fast on an invalid configuration
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        let separators = match config.strategy {
            ChunkStrategy::Recursive => config.separators(),
            ChunkStrategy::Fixed => Vec::new(),
        };
        Ok(Self { config, separators })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Split a document into ordered chunks
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text();
        if text.is_empty() {
            return Vec::new();
        }

        let spans = pack_segments(text, self.config.size, self.config.overlap, &self.separators);
        let spans = assign_overlap(text, spans, self.config.overlap);

        spans
            .into_iter()
            .enumerate()
            .map(|(index, span)| self.build_chunk(document, text, index, span))
            .collect()
    }

    fn build_chunk(&self, document: &Document, text: &str, index: usize, span: Span) -> Chunk {
        let mut metadata = document.metadata().clone();
        metadata.insert("document_id".to_string(), Value::from(document.id()));
        metadata.insert("chunk_index".to_string(), Value::from(index));

        Chunk {
            text: text[span.overlap_start..span.end].to_string(),
            metadata,
            index,
            overlap: text[span.overlap_start..span.start].chars().count(),
        }
    }
}

/// Chunk a document with the given configuration
pub fn chunk(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(config.clone())?.chunk(document))
}

/// Rebuild the source text by dropping each chunk's overlap prefix
pub fn reconstruct(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::body).collect()
}
