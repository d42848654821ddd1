//! Documents and chunks
//!
//! A [`Document`] is raw text plus source metadata and never changes after
//! construction. The chunker turns it into an ordered sequence of [`Chunk`]s,
//! each of which is a contiguous slice of the original text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Metadata attached to documents, chunks and index entries
pub type Metadata = serde_json::Map<String, Value>;

/// Raw text ingested into the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    text: String,
    metadata: Metadata,
    ingested_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with a random identity
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), text)
    }

    /// Create a document with a caller-chosen identity
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            ingested_at: Utc::now(),
        }
    }

    /// Attach source metadata (builder style, consumes self)
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Derive a new document from this one with replacement text.
    ///
    /// Identity and source metadata are kept, so re-chunked output of the
    /// cleaning pass overwrites the same index entries.
    pub fn revised(&self, text: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            text: text.into(),
            metadata: self.metadata.clone(),
            ingested_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A bounded text segment of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text, including the overlap prefix
    pub text: String,
    /// Source metadata plus derived attributes
    pub metadata: Metadata,
    /// Position within the parent document
    pub index: usize,
    /// Number of leading chars shared with the previous chunk
    pub overlap: usize,
}

impl Chunk {
    /// Text without the overlap prefix
    pub fn body(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None if self.overlap == 0 => &self.text,
            None => "",
        }
    }

    /// Length in chars
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Resolve a dotted field path (`nested.id`) against metadata.
///
/// A literal key containing dots takes precedence over path traversal.
pub fn lookup_field<'a>(metadata: &'a Metadata, path: &str) -> Option<&'a Value> {
    if let Some(value) = metadata.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = metadata.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_document_creation() {
        let doc = Document::with_id("doc-1", "hello");
        assert_eq!(doc.id(), "doc-1");
        assert_eq!(doc.text(), "hello");
        assert!(doc.metadata().is_empty());
        assert!(!doc.is_empty());
    }

    #[test]
    fn test_revised_keeps_identity() {
        let doc = Document::with_id("doc-1", "original")
            .with_metadata(meta(json!({"source": "wiki"})));
        let revised = doc.revised("cleaned");
        assert_eq!(revised.id(), "doc-1");
        assert_eq!(revised.text(), "cleaned");
        assert_eq!(revised.metadata()["source"], "wiki");
        assert_eq!(doc.text(), "original");
    }

    #[test]
    fn test_chunk_body_strips_overlap() {
        let chunk = Chunk {
            text: "lo world".to_string(),
            metadata: Metadata::new(),
            index: 1,
            overlap: 3,
        };
        assert_eq!(chunk.body(), "world");
        assert_eq!(chunk.char_len(), 8);
    }

    #[test]
    fn test_chunk_body_multibyte() {
        let chunk = Chunk {
            text: "éèabc".to_string(),
            metadata: Metadata::new(),
            index: 1,
            overlap: 2,
        };
        assert_eq!(chunk.body(), "abc");
    }

    #[test]
    fn test_lookup_nested_path() {
        let m = meta(json!({"nested": {"id": 3, "tags": ["a", "b"]}, "plain": true}));
        assert_eq!(lookup_field(&m, "nested.id"), Some(&json!(3)));
        assert_eq!(lookup_field(&m, "nested.tags.1"), Some(&json!("b")));
        assert_eq!(lookup_field(&m, "plain"), Some(&json!(true)));
        assert_eq!(lookup_field(&m, "nested.missing"), None);
        assert_eq!(lookup_field(&m, "plain.deeper"), None);
    }

    #[test]
    fn test_lookup_prefers_literal_dotted_key() {
        let m = meta(json!({"a.b": 1, "a": {"b": 2}}));
        assert_eq!(lookup_field(&m, "a.b"), Some(&json!(1)));
    }
}
