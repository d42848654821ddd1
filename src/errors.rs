//! Error types for metarag
//!
//! A single error enum covers every pipeline stage. Each variant belongs to
//! one of three categories (see [`ErrorKind`]): configuration problems fail
//! fast, integration problems abort the current run, and external service
//! failures are passed through unchanged. Nothing here is retried.

use crate::types::PipelineStep;
use thiserror::Error;

/// Broad classification of a [`RagError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid settings or predicates, detected before any work is done
    Configuration,
    /// A collaborator returned malformed or mismatched data
    Integration,
    /// Network failure, rate limit or provider outage
    ExternalService,
}

/// Main error type for the retrieval pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structurally invalid filter predicate
    #[error("Invalid filter predicate: {0}")]
    InvalidFilter(String),

    /// Index exists with a different dimension than requested
    #[error("Index '{index}' already exists with dimension {existing}, requested {requested}")]
    IndexDimensionConflict {
        index: String,
        existing: usize,
        requested: usize,
    },

    /// Contract violation by a collaborator or caller
    #[error("Integration error during {step} (document: {}): {reason}", .document.as_deref().unwrap_or("-"))]
    Integration {
        step: PipelineStep,
        document: Option<String>,
        reason: String,
    },

    /// Vector length does not match the index
    #[error("Dimension mismatch for index '{index}': expected {expected}, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    /// Upsert or query against an index that was never created
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Query state machine errors
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// External provider errors (Ollama, Qdrant, model hub)
    #[error("{service} error: {message}")]
    ExternalService { service: String, message: String },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Config(_)
            | RagError::InvalidFilter(_)
            | RagError::IndexDimensionConflict { .. } => ErrorKind::Configuration,
            RagError::Integration { .. }
            | RagError::DimensionMismatch { .. }
            | RagError::IndexNotFound(_)
            | RagError::InvalidTransition { .. }
            | RagError::Serialization(_) => ErrorKind::Integration,
            RagError::ExternalService { .. } | RagError::Http(_) | RagError::Io(_) => {
                ErrorKind::ExternalService
            }
        }
    }

    /// Shorthand for an integration error at a given step
    pub fn integration(
        step: PipelineStep,
        document: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        RagError::Integration {
            step,
            document: document.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Shorthand for an external service failure
    pub fn external(service: &str, message: impl ToString) -> Self {
        RagError::ExternalService {
            service: service.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::DimensionMismatch {
            index: "docs".to_string(),
            expected: 1536,
            actual: 768,
        };
        assert!(err.to_string().contains("1536"));
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn test_integration_error_carries_context() {
        let err = RagError::integration(PipelineStep::Embed, Some("doc-7"), "2 vectors for 3 chunks");
        let text = err.to_string();
        assert!(text.contains("embed"));
        assert!(text.contains("doc-7"));
        assert!(text.contains("2 vectors for 3 chunks"));
        assert_eq!(err.kind(), ErrorKind::Integration);
    }

    #[test]
    fn test_integration_error_without_document() {
        let err = RagError::integration(PipelineStep::Upsert, None, "length mismatch");
        assert!(err.to_string().contains("(document: -)"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RagError::Config("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(RagError::InvalidFilter("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(
            RagError::IndexDimensionConflict {
                index: "a".into(),
                existing: 3,
                requested: 4
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(RagError::IndexNotFound("a".into()).kind(), ErrorKind::Integration);
        assert_eq!(RagError::external("ollama", "down").kind(), ErrorKind::ExternalService);
    }

    #[test]
    fn test_unreadable_payload_is_integration() {
        let err: RagError = serde_json::from_str::<Vec<f32>>("{\"embedding\": [1.0]}")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Integration);
    }
}
