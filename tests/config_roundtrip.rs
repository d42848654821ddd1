//! Configuration file round trips

use tempfile::TempDir;

use metarag::config::{EmbedderKind, MetaragConfig, StoreBackend};
use metarag::filter::{FieldKind, MetadataSchema};
use metarag::planner::{ContextFormat, FilterMode};

#[test]
fn test_save_then_load_preserves_every_section() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = MetaragConfig::default();
    config.chunking.size = 300;
    config.chunking.overlap = 30;
    config.chunking.extract.keywords = true;
    config.retrieval.index = "papers".to_string();
    config.retrieval.dimension = 384;
    config.retrieval.filter_mode = FilterMode::Llm;
    config.retrieval.backend = StoreBackend::Memory;
    config.retrieval.schema = MetadataSchema::new()
        .with_field("nested.id", FieldKind::Integer)
        .with_field("author", FieldKind::String);
    config.retrieval.context.format = ContextFormat::Numbered;
    config.cleaning.enabled = true;
    config.embedding.provider = EmbedderKind::Local;
    config.embedding.dimension = 384;
    config.qdrant.url = "http://qdrant:6334".to_string();

    config.save(&path).unwrap();
    let loaded = MetaragConfig::load(Some(&path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_empty_file_is_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").unwrap();

    assert_eq!(MetaragConfig::load(Some(&path)).unwrap(), MetaragConfig::default());
}

#[test]
fn test_dimension_disagreement_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[embedding]\ndimension = 384\n").unwrap();

    let err = MetaragConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("embedding.dimension"));
}
