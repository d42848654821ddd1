//! Context assembly for answer synthesis
use serde::{Deserialize, Serialize};

use crate::types::QueryResult;

/// Context assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum characters of retrieved text placed in the prompt
    pub max_context_chars: usize,
    /// Include score and source document in each entry
    pub include_metadata: bool,
    /// Format for context presentation
    pub format: ContextFormat,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 8000,
            include_metadata: true,
            format: ContextFormat::Structured,
        }
    }
}

/// Format for presenting context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextFormat {
    /// Clear boundaries between passages
    #[default]
    Structured,
    /// Compact single line
    Inline,
    /// Numbered list
    Numbered,
}

/// Context ready to be placed into a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    /// Number of passages included
    pub passage_count: usize,
    /// Characters of retrieved text included
    pub char_count: usize,
    /// Entry ids included, in result order
    pub entry_ids: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.passage_count == 0
    }
}

/// Turns query results into a context block
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Build context from results in score order, stopping at the first
    /// passage that would exceed the character budget
    pub fn build(&self, results: &[QueryResult]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut total_chars = 0;
        let mut entry_ids = Vec::new();

        for result in results {
            let chars = result.text.chars().count();
            if total_chars + chars > self.config.max_context_chars {
                break;
            }

            parts.push(self.format_passage(parts.len() + 1, result));
            total_chars += chars;
            entry_ids.push(result.id.clone());
        }

        let text = match self.config.format {
            ContextFormat::Structured => {
                format!("Retrieved Context ({} passages):\n\n{}\n", parts.len(), parts.join("\n\n"))
            }
            ContextFormat::Inline => format!("Context: {}", parts.join(" | ")),
            ContextFormat::Numbered => format!("Context:\n{}\n", parts.join("\n")),
        };

        AssembledContext {
            text,
            passage_count: parts.len(),
            char_count: total_chars,
            entry_ids,
        }
    }

    fn format_passage(&self, index: usize, result: &QueryResult) -> String {
        let source = result
            .metadata
            .get("document_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        match (self.config.format, self.config.include_metadata) {
            (ContextFormat::Structured, true) => format!(
                "[Passage {}] (score: {:.2}, source: {})\n{}",
                index, result.score, source, result.text
            ),
            (ContextFormat::Structured, false) => format!("[Passage {}]\n{}", index, result.text),
            (ContextFormat::Inline, true) => format!("[{}|{:.2}] {}", source, result.score, result.text),
            (ContextFormat::Inline, false) => result.text.clone(),
            (ContextFormat::Numbered, true) => {
                format!("{}. (score: {:.2}) {}", index, result.score, result.text)
            }
            (ContextFormat::Numbered, false) => format!("{}. {}", index, result.text),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}
