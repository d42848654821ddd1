//! Keyword extraction: local term frequency and completion-backed

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::metadata::merge_extracted;
use crate::providers::TextCompletionProvider;
use crate::types::{Chunk, Metadata};

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "and", "are", "been", "but", "can", "for", "from", "had", "has",
    "have", "her", "his", "how", "into", "its", "more", "not", "one", "our", "out", "over",
    "she", "such", "than", "that", "the", "their", "them", "then", "there", "these", "they",
    "this", "those", "was", "were", "what", "when", "where", "which", "while", "who", "will",
    "with", "would", "you", "your",
];

/// Most frequent non-stop-words, ties broken by first occurrence
pub fn top_terms(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    let words = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()));

    for (position, word) in words.enumerate() {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked.into_iter().take(limit).map(|(word, _, _)| word).collect()
}

/// Normalize provider output like `"KEYWORDS: a, b ,, c"` into a clean list.
///
/// Strips a leading label, splits on commas and newlines, trims, drops
/// empties and case-insensitive duplicates while keeping order.
pub fn normalize_keywords(raw: &str) -> Vec<String> {
    let body = match raw.split_once(':') {
        Some((label, rest)) if label.trim().eq_ignore_ascii_case("keywords") => rest,
        _ => raw,
    };

    let mut seen = Vec::<String>::new();
    let mut keywords = Vec::new();
    for item in body.split([',', '\n']) {
        let keyword = item.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.');
        if keyword.is_empty() {
            continue;
        }
        let folded = keyword.to_lowercase();
        if seen.contains(&folded) {
            continue;
        }
        seen.push(folded);
        keywords.push(keyword.to_string());
    }
    keywords
}

/// Keyword extraction delegated to a text completion model
pub struct LlmKeywordExtractor {
    provider: Arc<dyn TextCompletionProvider>,
    max_keywords: usize,
}

impl LlmKeywordExtractor {
    pub fn new(provider: Arc<dyn TextCompletionProvider>, max_keywords: usize) -> Self {
        Self {
            provider,
            max_keywords,
        }
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "{}\n\nGive up to {} unique keywords for this document. \
             Format as comma separated. Keywords: ",
            text, self.max_keywords
        )
    }

    /// Derive keyword metadata for one chunk
    pub async fn extract(&self, chunk: &Chunk) -> Result<Metadata> {
        let raw = self.provider.complete(&self.prompt(chunk.body())).await?;
        let mut keywords = normalize_keywords(&raw);
        keywords.truncate(self.max_keywords);
        debug!(chunk = chunk.index, count = keywords.len(), "extracted keywords");

        let mut derived = Metadata::new();
        derived.insert("keywords".to_string(), Value::from(keywords));
        Ok(derived)
    }

    /// Merge keyword metadata into every chunk, one completion call per chunk
    pub async fn apply(&self, chunks: &mut [Chunk]) -> Result<()> {
        for chunk in chunks.iter_mut() {
            let derived = self.extract(chunk).await?;
            merge_extracted(&mut chunk.metadata, derived);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_terms_frequency_then_position() {
        let terms = top_terms("beta alpha beta gamma alpha beta", 3);
        assert_eq!(terms, vec!["beta", "alpha", "gamma"]);
    }

    #[test]
    fn test_top_terms_skips_stop_words_and_short_words() {
        let terms = top_terms("the of an and Rust", 5);
        assert_eq!(terms, vec!["rust"]);
    }

    #[test]
    fn test_normalize_with_label() {
        assert_eq!(
            normalize_keywords("KEYWORDS: apples, oranges ,, pears"),
            vec!["apples", "oranges", "pears"]
        );
    }

    #[test]
    fn test_normalize_deduplicates_case_insensitive() {
        assert_eq!(normalize_keywords("Rust, rust, \"Tokio\"."), vec!["Rust", "Tokio"]);
    }

    #[test]
    fn test_normalize_without_label_keeps_colons_in_text() {
        assert_eq!(normalize_keywords("time: now"), vec!["time: now"]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_keywords("  ,  ").is_empty());
    }
}
