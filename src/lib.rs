//! metarag - metadata-aware retrieval-augmented generation
//!
//! Documents are chunked, optionally cleaned by a completion model, enriched
//! with derived metadata, embedded and upserted into a vector index. Queries
//! are turned into an optional metadata filter, answered by similarity search
//! and synthesized into a grounded answer.
//!
//! # Architecture
//!
//! - **Ingestion**: `chunking`, `cleaning`, `metadata`, `pipeline`
//! - **Querying**: `filter`, `planner`
//! - **Collaborators**: `providers` (embedding and completion), `store` (vector databases)
//! - **Interface**: `cli`, `config`, `doctor`

pub mod errors;
pub mod types;

// Ingestion
pub mod chunking;
pub mod cleaning;
pub mod metadata;
pub mod pipeline;

// Querying
pub mod filter;
pub mod planner;

// External collaborators
pub mod providers;
pub mod store;

// Interface
pub mod cli;
pub mod config;
pub mod doctor;

// Re-export commonly used types
pub use chunking::{reconstruct, ChunkConfig, ChunkStrategy, Chunker};
pub use config::MetaragConfig;
pub use errors::{ErrorKind, RagError, Result};
pub use filter::{FilterParser, FilterPredicate, MetadataSchema};
pub use pipeline::{IngestReport, IngestState, IngestionPipeline, PipelineConfig};
pub use planner::{QueryOutcome, QueryPlanner, QueryState};
pub use providers::{EmbeddingProvider, TextCompletionProvider};
pub use store::{InMemoryVectorStore, QdrantGateway, UpsertBatch, VectorStoreGateway};
pub use types::{Chunk, DataQualityWarning, Document, Metadata, QueryResult};
