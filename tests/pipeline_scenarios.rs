//! End-to-end ingestion scenarios with deterministic collaborators

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{CountingEmbedder, CountingStore, ScriptedCompletion};
use metarag::chunking::{reconstruct, ChunkConfig, Chunker};
use metarag::cleaning::Cleaner;
use metarag::errors::{ErrorKind, RagError};
use metarag::metadata::{ExtractConfig, KeywordSource};
use metarag::pipeline::{IngestState, IngestionPipeline, PipelineConfig};
use metarag::store::VectorStoreGateway;
use metarag::types::{DataQualityWarning, Document, PipelineStep};

const DIM: usize = 32;

fn pipeline_config(size: usize, overlap: usize) -> PipelineConfig {
    PipelineConfig {
        index: "scenarios".to_string(),
        dimension: DIM,
        chunking: ChunkConfig {
            size,
            overlap,
            separator: "\n".to_string(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_scenario_a_600_chars_three_chunks() {
    let text = "abcdefghij".repeat(60);
    let document = Document::with_id("doc-a", text.clone());

    let chunker = Chunker::new(pipeline_config(256, 50).chunking).unwrap();
    let chunks = chunker.chunk(&document);
    let lengths: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
    assert_eq!(lengths, vec![256, 256, 188]);
    assert_eq!(reconstruct(&chunks), text);

    let embedder = CountingEmbedder::new(DIM);
    let store = CountingStore::new();
    let pipeline = IngestionPipeline::new(pipeline_config(256, 50), embedder.clone(), store.clone()).unwrap();
    pipeline.ensure_index().await.unwrap();

    let report = pipeline.ingest(&document).await.unwrap();
    assert_eq!(report.state, IngestState::Done);
    assert_eq!(report.chunks_indexed, 3);
    assert!(report.warnings.is_empty());
    assert_eq!(embedder.calls(), 1);
    assert_eq!(store.upserts(), 1);
    assert_eq!(store.count("scenarios").await.unwrap(), 3);
}

#[tokio::test]
async fn test_scenario_c_empty_cleaning_skips_embed_and_upsert() {
    let embedder = CountingEmbedder::new(DIM);
    let store = CountingStore::new();
    let completion = ScriptedCompletion::new(&["   "]);

    let pipeline = IngestionPipeline::new(pipeline_config(64, 8), embedder.clone(), store.clone())
        .unwrap()
        .with_cleaner(Cleaner::new(completion.clone()));
    pipeline.ensure_index().await.unwrap();

    let report = pipeline
        .ingest(&Document::with_id("doc-c", "duplicate line\nduplicate line\n"))
        .await
        .unwrap();

    assert_eq!(report.state, IngestState::Done);
    assert_eq!(report.chunks_indexed, 0);
    assert!(report.warnings.contains(&DataQualityWarning::EmptyCleanedOutput {
        document: "doc-c".to_string()
    }));
    assert!(report.warnings.contains(&DataQualityWarning::NoChunksProduced {
        document: "doc-c".to_string()
    }));
    assert!(!report.steps.contains(&PipelineStep::Embed));

    assert_eq!(completion.prompts().len(), 1);
    assert_eq!(embedder.calls(), 0);
    assert_eq!(store.upserts(), 0);
    assert_eq!(store.count("scenarios").await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleaned_text_is_what_gets_indexed() {
    let store = CountingStore::new();
    let completion = ScriptedCompletion::new(&["Rust ships a borrow checker."]);
    let pipeline = IngestionPipeline::new(pipeline_config(128, 16), CountingEmbedder::new(DIM), store.clone())
        .unwrap()
        .with_cleaner(Cleaner::new(completion.clone()));
    pipeline.ensure_index().await.unwrap();

    let report = pipeline
        .ingest(&Document::with_id("doc", "Rust ships a borrow checker.\nRust ships a borrow checker.\n"))
        .await
        .unwrap();
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(
        report.steps,
        vec![
            PipelineStep::Chunk,
            PipelineStep::Clean,
            PipelineStep::Chunk,
            PipelineStep::Extract,
            PipelineStep::Embed,
            PipelineStep::Upsert,
        ]
    );

    let vector = metarag::providers::HashingEmbedder::new(DIM).embed_text("borrow checker");
    let hits = store.query("scenarios", &vector, None, 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "Rust ships a borrow checker.");
    assert_eq!(hits[0].metadata["document_id"], "doc");
    assert!(completion.prompts()[0].contains("remove duplicates"));
}

#[tokio::test]
async fn test_embedding_count_mismatch_is_integration_error() {
    let store = CountingStore::new();
    let pipeline = IngestionPipeline::new(pipeline_config(16, 0), CountingEmbedder::miscounting(DIM), store.clone())
        .unwrap();
    pipeline.ensure_index().await.unwrap();

    let err = pipeline
        .ingest(&Document::with_id("doc-mismatch", "one two three four five six seven eight nine ten"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Integration);
    match &err {
        RagError::Integration { step, document, .. } => {
            assert_eq!(*step, PipelineStep::Embed);
            assert_eq!(document.as_deref(), Some("doc-mismatch"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(store.upserts(), 0);
    assert_eq!(store.count("scenarios").await.unwrap(), 0);
}

#[tokio::test]
async fn test_nan_embedding_is_rejected_before_upsert() {
    let store = CountingStore::new();
    let pipeline = IngestionPipeline::new(pipeline_config(16, 0), CountingEmbedder::nan_emitting(DIM), store.clone())
        .unwrap();
    pipeline.ensure_index().await.unwrap();

    let err = pipeline
        .ingest(&Document::with_id("doc-nan", "one two three four five six seven eight nine ten"))
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        RagError::Integration { step: PipelineStep::Embed, document: Some(d), .. } if d == "doc-nan"
    ));
    assert_eq!(store.upserts(), 0);
    assert_eq!(store.count("scenarios").await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancelled_run_leaves_index_unchanged() {
    let store = CountingStore::new();
    let completion = ScriptedCompletion::slow(&["never delivered"], Duration::from_secs(10));
    let pipeline = IngestionPipeline::new(pipeline_config(64, 8), CountingEmbedder::new(DIM), store.clone())
        .unwrap()
        .with_cleaner(Cleaner::new(completion));
    pipeline.ensure_index().await.unwrap();

    let document = Document::with_id("doc-slow", "some text that needs cleaning");
    let outcome = tokio::time::timeout(Duration::from_millis(50), pipeline.ingest(&document)).await;

    assert!(outcome.is_err());
    assert_eq!(store.upserts(), 0);
    assert_eq!(store.count("scenarios").await.unwrap(), 0);
}

#[tokio::test]
async fn test_upsert_into_missing_index_fails() {
    let pipeline = IngestionPipeline::new(pipeline_config(64, 8), CountingEmbedder::new(DIM), CountingStore::new())
        .unwrap();
    let err = pipeline.ingest(&Document::with_id("d", "text")).await.unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound(_)));
}

#[tokio::test]
async fn test_concurrent_documents_share_one_index() {
    let store = CountingStore::new();
    let pipeline = Arc::new(
        IngestionPipeline::new(pipeline_config(32, 4), CountingEmbedder::new(DIM), store.clone()).unwrap(),
    );
    pipeline.ensure_index().await.unwrap();

    let documents: Vec<Document> = (0..8)
        .map(|i| Document::with_id(format!("doc-{}", i), format!("document number {} about tokio", i)))
        .collect();

    let reports = pipeline.ingest_many(&documents, 4).await;
    let ids: Vec<String> = reports.iter().map(|r| r.as_ref().unwrap().document_id.clone()).collect();
    let expected: Vec<String> = documents.iter().map(|d| d.id().to_string()).collect();
    assert_eq!(ids, expected);

    let total: usize = reports.iter().map(|r| r.as_ref().unwrap().chunks_indexed).sum();
    assert_eq!(store.count("scenarios").await.unwrap(), total);
}

#[tokio::test]
async fn test_llm_keywords_are_normalized_into_metadata() {
    let store = CountingStore::new();
    let mut config = pipeline_config(256, 0);
    config.chunking.extract = ExtractConfig {
        keywords: true,
        max_keywords: 5,
        source: KeywordSource::Llm,
    };

    let pipeline = IngestionPipeline::new(config, CountingEmbedder::new(DIM), store.clone())
        .unwrap()
        .with_keyword_model(ScriptedCompletion::new(&["KEYWORDS: Rust, tokio ,, rust"]));
    pipeline.ensure_index().await.unwrap();
    pipeline
        .ingest(&Document::with_id("kw", "Async Rust on the tokio runtime."))
        .await
        .unwrap();

    let vector = metarag::providers::HashingEmbedder::new(DIM).embed_text("tokio");
    let hits = store.query("scenarios", &vector, None, 1).await.unwrap();
    assert_eq!(hits[0].metadata["extracted"]["keywords"], json!(["Rust", "tokio"]));
}
