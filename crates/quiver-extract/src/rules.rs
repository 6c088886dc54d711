//! Rule-based proposition extraction
//!
//! Sentence-boundary splitting with no network dependency. The results
//! are coarser than LLM extraction (no pronoun resolution), which is
//! acceptable for offline runs and deterministic tests.

use async_trait::async_trait;
use quiver_core::{QuiverError, Result};
use regex::Regex;

/// Sentence-per-proposition extractor.
pub struct RuleBasedExtractor {
    sentence: Regex,
}

impl RuleBasedExtractor {
    pub fn new() -> Self {
        // A sentence: a run of non-terminator characters followed by
        // terminators (kept with the sentence).
        let sentence =
            Regex::new(r"[^.!?]+[.!?]+|[^.!?]+$").expect("sentence pattern is a valid regex");
        Self { sentence }
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::PropositionExtractor for RuleBasedExtractor {
    async fn extract(&self, paragraph: &str) -> Result<Vec<String>> {
        if paragraph.trim().is_empty() {
            return Err(QuiverError::Extraction(
                "cannot extract from empty paragraph".to_string(),
            ));
        }

        let flattened = paragraph.replace('\n', " ");
        let sentences: Vec<String> = self
            .sentence
            .find_iter(&flattened)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(sentences)
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PropositionExtractor;

    #[tokio::test]
    async fn test_splits_on_sentence_boundaries() {
        let extractor = RuleBasedExtractor::new();
        let props = extractor
            .extract("The sky is blue. Water boils at 100C. Is that so?")
            .await
            .unwrap();

        assert_eq!(
            props,
            vec!["The sky is blue.", "Water boils at 100C.", "Is that so?"]
        );
    }

    #[tokio::test]
    async fn test_keeps_trailing_fragment_without_terminator() {
        let extractor = RuleBasedExtractor::new();
        let props = extractor.extract("One sentence. And a fragment").await.unwrap();
        assert_eq!(props, vec!["One sentence.", "And a fragment"]);
    }

    #[tokio::test]
    async fn test_joins_wrapped_lines() {
        let extractor = RuleBasedExtractor::new();
        let props = extractor
            .extract("A statement\nwrapped across lines.")
            .await
            .unwrap();
        assert_eq!(props, vec!["A statement wrapped across lines."]);
    }

    #[tokio::test]
    async fn test_empty_paragraph_is_an_error() {
        let extractor = RuleBasedExtractor::new();
        assert!(extractor.extract("   ").await.is_err());
    }
}
