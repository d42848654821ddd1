//! Ingestion pipeline
//!
//! Chunk → (Clean → re-chunk) → Extract → Embed → Upsert, one document at a
//! time. Upsert is the last step, so a run that fails or is dropped before
//! it leaves the index untouched.

use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunking::{ChunkConfig, Chunker};
use crate::cleaning::Cleaner;
use crate::errors::{RagError, Result};
use crate::metadata::{KeywordSource, LlmKeywordExtractor, MetadataExtractor};
use crate::providers::{EmbeddingProvider, TextCompletionProvider};
use crate::store::{non_finite_position, IndexStatus, UpsertBatch, VectorStoreGateway};
use crate::types::{Chunk, DataQualityWarning, Document, PipelineStep};

/// Progress of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Started,
    Chunked,
    Cleaned,
    Extracted,
    Embedded,
    Done,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "started",
            Self::Chunked => "chunked",
            Self::Cleaned => "cleaned",
            Self::Extracted => "extracted",
            Self::Embedded => "embedded",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of ingesting one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_indexed: usize,
    pub state: IngestState,
    /// Steps that ran, in order
    pub steps: Vec<PipelineStep>,
    pub warnings: Vec<DataQualityWarning>,
}

impl IngestReport {
    fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            chunks_indexed: 0,
            state: IngestState::Started,
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn advance(&mut self, step: PipelineStep, state: IngestState) {
        debug!(document = %self.document_id, %step, %state, "ingestion step complete");
        self.steps.push(step);
        self.state = state;
    }

    fn warn(&mut self, warning: DataQualityWarning) {
        warn!(document = %self.document_id, "{}", warning);
        self.warnings.push(warning);
    }
}

/// Fixed settings for an ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target index name
    pub index: String,
    /// Declared vector dimension of the index
    pub dimension: usize,
    pub chunking: ChunkConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.index.trim().is_empty() {
            return Err(RagError::Config("index name must not be empty".to_string()));
        }
        if self.dimension == 0 {
            return Err(RagError::Config("index dimension must be greater than 0".to_string()));
        }
        self.chunking.validate()
    }
}

/// Document ingestion with explicit provider and store handles
pub struct IngestionPipeline {
    config: PipelineConfig,
    chunker: Chunker,
    extractor: MetadataExtractor,
    keyword_model: Option<LlmKeywordExtractor>,
    cleaner: Option<Cleaner>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreGateway>,
}

impl IngestionPipeline {
    /// Build a pipeline, validating configuration up front
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreGateway>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension {
            return Err(RagError::Config(format!(
                "embedding model '{}' produces {}-d vectors but index '{}' is {}-d",
                embedder.model_id(),
                embedder.dimension(),
                config.index,
                config.dimension
            )));
        }
        let chunker = Chunker::new(config.chunking.clone())?;
        let extractor = MetadataExtractor::new(config.chunking.extract.clone());

        Ok(Self {
            config,
            chunker,
            extractor,
            keyword_model: None,
            cleaner: None,
            embedder,
            store,
        })
    }

    /// Enable the cleaning pass
    pub fn with_cleaner(mut self, cleaner: Cleaner) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    /// Completion model for `source = "llm"` keyword extraction
    pub fn with_keyword_model(mut self, provider: Arc<dyn TextCompletionProvider>) -> Self {
        let extract = &self.config.chunking.extract;
        if extract.keywords && extract.source == KeywordSource::Llm {
            self.keyword_model = Some(LlmKeywordExtractor::new(provider, extract.max_keywords));
        }
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create the target index if needed
    pub async fn ensure_index(&self) -> Result<IndexStatus> {
        let status = self
            .store
            .create_index(&self.config.index, self.config.dimension)
            .await?;
        debug!(index = %self.config.index, ?status, backend = self.store.backend(), "index ready");
        Ok(status)
    }

    /// Ingest one document
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let mut report = IngestReport::new(document.id());

        let mut chunks = self.chunker.chunk(document);
        report.advance(PipelineStep::Chunk, IngestState::Chunked);

        if let Some(cleaner) = &self.cleaner {
            if !chunks.is_empty() {
                let (revised, warning) = cleaner.clean_document(document, &chunks).await?;
                if let Some(warning) = warning {
                    report.warn(warning);
                }
                report.advance(PipelineStep::Clean, IngestState::Cleaned);

                chunks = self.chunker.chunk(&revised);
                report.advance(PipelineStep::Chunk, IngestState::Chunked);
            }
        }

        if chunks.is_empty() {
            report.warn(DataQualityWarning::NoChunksProduced {
                document: document.id().to_string(),
            });
            report.state = IngestState::Done;
            return Ok(report);
        }

        self.extract(&mut chunks).await?;
        report.advance(PipelineStep::Extract, IngestState::Extracted);

        let vectors = self.embed(document.id(), &chunks).await?;
        report.advance(PipelineStep::Embed, IngestState::Embedded);

        let batch = UpsertBatch::from_chunks(document.id(), &chunks, vectors)?;
        self.store.upsert(&self.config.index, batch).await?;
        report.chunks_indexed = chunks.len();
        report.advance(PipelineStep::Upsert, IngestState::Done);

        info!(
            document = document.id(),
            chunks = report.chunks_indexed,
            index = %self.config.index,
            "document ingested"
        );
        Ok(report)
    }

    /// Ingest several documents with up to `concurrency` runs in flight.
    /// Results are returned in input order.
    pub async fn ingest_many(&self, documents: &[Document], concurrency: usize) -> Vec<Result<IngestReport>> {
        stream::iter(documents)
            .map(|document| self.ingest(document))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn extract(&self, chunks: &mut [Chunk]) -> Result<()> {
        self.extractor.apply(chunks);
        if let Some(keyword_model) = &self.keyword_model {
            keyword_model.apply(chunks).await?;
        }
        Ok(())
    }

    /// One batched call per document; count, dimension and finiteness are verified
    async fn embed(&self, document_id: &str, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        if vectors.len() != texts.len() {
            return Err(RagError::integration(
                PipelineStep::Embed,
                Some(document_id),
                format!("provider returned {} vectors for {} chunks", vectors.len(), texts.len()),
            ));
        }
        if let Some((position, bad)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.config.dimension)
        {
            return Err(RagError::integration(
                PipelineStep::Embed,
                Some(document_id),
                format!(
                    "vector {} has dimension {}, expected {}",
                    position,
                    bad.len(),
                    self.config.dimension
                ),
            ));
        }
        if let Some(position) = non_finite_position(&vectors) {
            return Err(RagError::integration(
                PipelineStep::Embed,
                Some(document_id),
                format!("vector {} has a non-finite component", position),
            ));
        }
        Ok(vectors)
    }
}
