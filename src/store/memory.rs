//! In-memory vector store
//!
//! Brute-force cosine similarity over every entry of an index. Suitable for
//! tests, offline runs and small corpora. A single `RwLock` serializes
//! writers, so concurrent pipelines can upsert into the same index.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::filter::FilterPredicate;
use crate::store::{into_query_result, IndexStatus, UpsertBatch, VectorStoreGateway};
use crate::types::{Metadata, PipelineStep, QueryResult};

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    vector: Vec<f32>,
    metadata: Metadata,
}

#[derive(Debug, Clone)]
struct MemoryIndex {
    dimension: usize,
    /// Insertion order; overwrites keep their original slot
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl MemoryIndex {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a * norm_b);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Vector store held entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    indexes: Arc<RwLock<HashMap<String, MemoryIndex>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all indexes
    pub async fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Declared dimension of an index
    pub async fn dimension(&self, index: &str) -> Option<usize> {
        self.indexes.read().await.get(index).map(|i| i.dimension)
    }
}

#[async_trait]
impl VectorStoreGateway for InMemoryVectorStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_index(&self, name: &str, dimension: usize) -> Result<IndexStatus> {
        if dimension == 0 {
            return Err(RagError::Config("index dimension must be greater than 0".to_string()));
        }

        let mut indexes = self.indexes.write().await;
        match indexes.get(name) {
            Some(existing) if existing.dimension == dimension => Ok(IndexStatus::AlreadyExists),
            Some(existing) => Err(RagError::IndexDimensionConflict {
                index: name.to_string(),
                existing: existing.dimension,
                requested: dimension,
            }),
            None => {
                indexes.insert(name.to_string(), MemoryIndex::new(dimension));
                debug!(index = name, dimension, "created in-memory index");
                Ok(IndexStatus::Created)
            }
        }
    }

    async fn upsert(&self, index: &str, batch: UpsertBatch) -> Result<()> {
        let mut indexes = self.indexes.write().await;
        let target = indexes
            .get_mut(index)
            .ok_or_else(|| RagError::IndexNotFound(index.to_string()))?;

        // Reject the whole batch before touching any entry
        if let Some(bad) = batch.vectors().iter().find(|v| v.len() != target.dimension) {
            return Err(RagError::DimensionMismatch {
                index: index.to_string(),
                expected: target.dimension,
                actual: bad.len(),
            });
        }

        let count = batch.len();
        let (ids, vectors, metadata) = batch.into_parts();
        for ((id, vector), metadata) in ids.into_iter().zip(vectors).zip(metadata) {
            match target.positions.get(&id) {
                Some(&slot) => {
                    target.entries[slot].vector = vector;
                    target.entries[slot].metadata = metadata;
                }
                None => {
                    target.positions.insert(id.clone(), target.entries.len());
                    target.entries.push(Entry { id, vector, metadata });
                }
            }
        }

        debug!(index, count, total = target.entries.len(), "upserted entries");
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        filter: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>> {
        let indexes = self.indexes.read().await;
        let target = indexes
            .get(index)
            .ok_or_else(|| RagError::IndexNotFound(index.to_string()))?;

        if vector.len() != target.dimension {
            return Err(RagError::DimensionMismatch {
                index: index.to_string(),
                expected: target.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::integration(
                PipelineStep::Retrieve,
                None,
                "query vector has a non-finite component",
            ));
        }

        let compiled = filter.map(FilterPredicate::compile).transpose()?;

        let mut scored: Vec<(f32, &Entry)> = target
            .entries
            .iter()
            .filter(|e| compiled.as_ref().map_or(true, |c| c.matches(&e.metadata)))
            .map(|e| (cosine_similarity(vector, &e.vector), e))
            .collect();

        // Stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let results: Vec<QueryResult> = scored
            .into_iter()
            .take(top_k)
            .map(|(score, e)| into_query_result(e.id.clone(), score, e.metadata.clone()))
            .collect();

        debug!(index, hits = results.len(), filtered = filter.is_some(), "in-memory query");
        Ok(results)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        self.indexes
            .read()
            .await
            .get(index)
            .map(|i| i.entries.len())
            .ok_or_else(|| RagError::IndexNotFound(index.to_string()))
    }
}
