//! Vector store gateways
//!
//! The pipeline talks to vector databases through [`VectorStoreGateway`].
//! Two implementations ship with the crate:
//! - [`InMemoryVectorStore`]: brute-force cosine search, used offline and in tests
//! - [`QdrantGateway`]: a Qdrant server over gRPC
//!
//! Every entry carries the chunk text under the `text` metadata key so that
//! filters can address it like any other field.

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{RagError, Result};
use crate::filter::{FilterPredicate, TEXT_FIELD};
use crate::types::{Chunk, Metadata, PipelineStep, QueryResult};

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantGateway;

/// Outcome of [`VectorStoreGateway::create_index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Created,
    /// Index was already present with the requested dimension
    AlreadyExists,
}

/// Stable entry identity for a chunk; re-ingesting a document overwrites
/// its previous entries.
pub fn entry_id(document_id: &str, chunk_index: usize) -> String {
    let name = format!("{}#{}", document_id, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Position of the first vector holding a NaN or infinite component
pub fn non_finite_position(vectors: &[Vec<f32>]) -> Option<usize> {
    vectors.iter().position(|v| v.iter().any(|x| !x.is_finite()))
}

/// Positionally aligned ids, vectors and metadata for one upsert call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertBatch {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Metadata>,
}

impl UpsertBatch {
    /// Build a batch, rejecting misaligned inputs before any store call
    pub fn new(ids: Vec<String>, vectors: Vec<Vec<f32>>, metadata: Vec<Metadata>) -> Result<Self> {
        if vectors.len() != metadata.len() || ids.len() != vectors.len() {
            return Err(RagError::integration(
                PipelineStep::Upsert,
                None,
                format!(
                    "misaligned upsert: {} ids, {} vectors, {} metadata entries",
                    ids.len(),
                    vectors.len(),
                    metadata.len()
                ),
            ));
        }
        if let Some(position) = non_finite_position(&vectors) {
            return Err(RagError::integration(
                PipelineStep::Upsert,
                None,
                format!("vector {} ({}) has a non-finite component", position, ids[position]),
            ));
        }
        Ok(Self { ids, vectors, metadata })
    }

    /// Batch for a document's chunks; the chunk text is copied into metadata
    pub fn from_chunks(document_id: &str, chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<Self> {
        let ids = chunks.iter().map(|c| entry_id(document_id, c.index)).collect();
        let metadata = chunks
            .iter()
            .map(|c| {
                let mut m = c.metadata.clone();
                m.insert(TEXT_FIELD.to_string(), Value::from(c.text.clone()));
                m
            })
            .collect();

        Self::new(ids, vectors, metadata).map_err(|e| match e {
            RagError::Integration { step, reason, .. } => RagError::Integration {
                step,
                document: Some(document_id.to_string()),
                reason,
            },
            other => other,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    /// Iterate `(id, vector, metadata)` triples
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<f32>, &Metadata)> {
        self.ids
            .iter()
            .zip(self.vectors.iter())
            .zip(self.metadata.iter())
            .map(|((id, vector), metadata)| (id, vector, metadata))
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<f32>>, Vec<Metadata>) {
        (self.ids, self.vectors, self.metadata)
    }
}

/// Split stored metadata into chunk text and the remaining fields
pub(crate) fn into_query_result(id: String, score: f32, mut metadata: Metadata) -> QueryResult {
    let text = match metadata.remove(TEXT_FIELD) {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    QueryResult {
        id,
        text,
        score,
        metadata,
    }
}

/// Narrow interface over an external vector database
#[async_trait]
pub trait VectorStoreGateway: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Create a named index. Existing index with the same dimension is
    /// `AlreadyExists`; a different dimension is a configuration error.
    async fn create_index(&self, name: &str, dimension: usize) -> Result<IndexStatus>;

    /// Insert or overwrite entries by id
    async fn upsert(&self, index: &str, batch: UpsertBatch) -> Result<()>;

    /// Similarity search ordered by descending score, at most `top_k` results
    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        filter: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>>;

    /// Number of entries in an index
    async fn count(&self, index: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_entry_id_is_stable() {
        assert_eq!(entry_id("doc", 0), entry_id("doc", 0));
        assert_ne!(entry_id("doc", 0), entry_id("doc", 1));
        assert_ne!(entry_id("doc", 1), entry_id("doc1", 0));
        assert!(Uuid::parse_str(&entry_id("doc", 3)).is_ok());
    }

    #[test]
    fn test_batch_rejects_length_mismatch() {
        let err = UpsertBatch::new(
            vec!["a".into(), "b".into()],
            vec![vec![0.0], vec![1.0]],
            vec![Metadata::new()],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integration);
        assert!(err.to_string().contains("upsert"));
    }

    #[test]
    fn test_batch_rejects_non_finite_vector() {
        let err = UpsertBatch::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 0.0], vec![f32::NAN, 1.0]],
            vec![Metadata::new(), Metadata::new()],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integration);
        assert!(err.to_string().contains("non-finite"));
        assert_eq!(non_finite_position(&[vec![0.5], vec![f32::INFINITY]]), Some(1));
        assert_eq!(non_finite_position(&[vec![0.5]]), None);
    }

    #[test]
    fn test_batch_from_chunks_copies_text() {
        let chunks = vec![Chunk {
            text: "hello".to_string(),
            metadata: Metadata::new(),
            index: 0,
            overlap: 0,
        }];
        let batch = UpsertBatch::from_chunks("doc-1", &chunks, vec![vec![1.0, 0.0]]).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.ids()[0], entry_id("doc-1", 0));
        assert_eq!(batch.metadata()[0]["text"], "hello");
    }

    #[test]
    fn test_batch_from_chunks_names_document() {
        let err = UpsertBatch::from_chunks("doc-9", &[], vec![vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("doc-9"));
    }

    #[test]
    fn test_query_result_splits_text() {
        let mut metadata = Metadata::new();
        metadata.insert("text".into(), Value::from("body"));
        metadata.insert("k".into(), Value::from(1));
        let result = into_query_result("id".into(), 0.5, metadata);
        assert_eq!(result.text, "body");
        assert!(!result.metadata.contains_key("text"));
        assert_eq!(result.metadata["k"], 1);
    }
}
