//! Completion-backed cleaning pass
//!
//! Sends chunk text to a generative model with an instruction such as
//! "filter out irrelevant information and remove duplicates" and returns the
//! model's revision. The pipeline re-chunks that revision as a new document.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::providers::TextCompletionProvider;
use crate::types::{Chunk, DataQualityWarning, Document};

/// Instruction used when none is configured
pub const DEFAULT_INSTRUCTIONS: &str = "Filter out irrelevant information and remove duplicates.";

/// Stateless wrapper around a completion provider
pub struct Cleaner {
    provider: Arc<dyn TextCompletionProvider>,
    instructions: String,
}

impl Cleaner {
    pub fn new(provider: Arc<dyn TextCompletionProvider>) -> Self {
        Self::with_instructions(provider, DEFAULT_INSTRUCTIONS)
    }

    pub fn with_instructions(
        provider: Arc<dyn TextCompletionProvider>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            instructions: instructions.into(),
        }
    }

    /// Configured instructions
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Assemble the cleaning prompt. Overlap prefixes are dropped so the
    /// model sees each passage once.
    pub fn build_prompt(chunks: &[Chunk], instructions: &str) -> String {
        let passages = chunks
            .iter()
            .map(Chunk::body)
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\nReturn only the revised text, with no commentary.\n\n\
             <text>\n{}\n</text>",
            instructions.trim(),
            passages
        )
    }

    /// Revise chunk text with explicit instructions.
    ///
    /// Provider errors propagate unchanged. The returned text may be empty.
    pub async fn clean(&self, chunks: &[Chunk], instructions: &str) -> Result<String> {
        let prompt = Self::build_prompt(chunks, instructions);
        debug!(
            model = self.provider.model_id(),
            chunks = chunks.len(),
            prompt_chars = prompt.len(),
            "cleaning chunks"
        );

        let revised = self.provider.complete(&prompt).await?;
        Ok(revised.trim().to_string())
    }

    /// Clean with the configured instructions and wrap the result as a
    /// revision of `document`. Empty output is reported, not rejected.
    pub async fn clean_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(Document, Option<DataQualityWarning>)> {
        let revised = self.clean(chunks, &self.instructions).await?;

        let warning = if revised.is_empty() {
            warn!(document = document.id(), "cleaning pass returned empty text");
            Some(DataQualityWarning::EmptyCleanedOutput {
                document: document.id().to_string(),
            })
        } else {
            None
        };

        Ok((document.revised(revised), warning))
    }
}
