//! Known metadata fields
//!
//! The schema tells the query planner which words in a query are field
//! references and lets predicates be checked for unknown fields and obvious
//! type errors before they reach a store.

use serde::{Deserialize, Serialize};

/// Reserved field name that addresses the chunk text itself
pub const TEXT_FIELD: &str = "text";

/// Value type of a metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Bool,
    /// List of strings, e.g. `extracted.keywords`
    Keywords,
    /// No type checking
    Any,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Keywords)
    }
}

/// One schema entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Dotted path into chunk metadata
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_kind() -> FieldKind {
    FieldKind::Any
}

/// Set of metadata fields a query may filter on.
///
/// An empty schema accepts every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataSchema {
    fields: Vec<FieldSpec>,
}

impl MetadataSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style)
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            description: None,
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by path. A declared object field also covers its
    /// children, so `nested` makes `nested.id` known.
    pub fn field(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == path).or_else(|| {
            self.fields.iter().find(|f| {
                path.strip_prefix(f.name.as_str())
                    .map_or(false, |rest| rest.starts_with('.'))
            })
        })
    }

    /// True when the path may be referenced in a predicate
    pub fn knows(&self, path: &str) -> bool {
        path == TEXT_FIELD || self.is_empty() || self.field(path).is_some()
    }

    /// Declared kind for an exact path, `Any` when unknown or inherited
    pub fn kind_of(&self, path: &str) -> FieldKind {
        if path == TEXT_FIELD {
            return FieldKind::String;
        }
        self.fields
            .iter()
            .find(|f| f.name == path)
            .map_or(FieldKind::Any, |f| f.kind)
    }

    /// Human-readable listing for prompts
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("- {} (string): the chunk text", TEXT_FIELD)];
        for field in &self.fields {
            let kind = serde_json::to_value(field.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            match &field.description {
                Some(description) => lines.push(format!("- {} ({}): {}", field.name, kind, description)),
                None => lines.push(format!("- {} ({})", field.name, kind)),
            }
        }
        lines.join("\n")
    }
}
