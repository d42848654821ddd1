//! Type definitions module
//!
//! Documents, chunks and the values that flow between pipeline stages.

pub mod document;
pub mod results;

// Re-export commonly used types
pub use document::{lookup_field, Chunk, Document, Metadata};
pub use results::{DataQualityWarning, PipelineStep, QueryResult};
