//! Pipeline step names, query results and data quality signals

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Metadata;

/// Stage of ingestion or querying, used to label errors and warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Chunk,
    Clean,
    Extract,
    Embed,
    CreateIndex,
    Upsert,
    FilterConstruction,
    Retrieve,
    Synthesize,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Clean => "clean",
            Self::Extract => "extract",
            Self::Embed => "embed",
            Self::CreateIndex => "create_index",
            Self::Upsert => "upsert",
            Self::FilterConstruction => "filter_construction",
            Self::Retrieve => "retrieve",
            Self::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hit from a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Non-fatal signal that a run produced suspicious output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// The cleaning pass returned blank text
    EmptyCleanedOutput { document: String },
    /// Chunking yielded nothing to embed
    NoChunksProduced { document: String },
    /// A filter could not be constructed and the query fell back to pure semantic search
    FilterDiscarded { reason: String },
    /// Retrieval produced no context for synthesis
    EmptyContext { query: String },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCleanedOutput { document } => {
                write!(f, "cleaning returned empty text for document {}", document)
            }
            Self::NoChunksProduced { document } => {
                write!(f, "no chunks produced for document {}", document)
            }
            Self::FilterDiscarded { reason } => write!(f, "filter discarded: {}", reason),
            Self::EmptyContext { query } => write!(f, "no context retrieved for query '{}'", query),
        }
    }
}
