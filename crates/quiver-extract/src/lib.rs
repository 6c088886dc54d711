//! Quiver Extract - Proposition extraction
//!
//! Turns raw document text into short, self-contained factual statements.
//! The heavy lifting is delegated to an LLM collaborator; a rule-based
//! splitter covers offline runs and tests.

use async_trait::async_trait;
use quiver_core::{ExtractorConfig, ExtractorProvider, Result};
use std::sync::Arc;

pub mod gemini;
pub mod rules;

pub use gemini::GeminiExtractor;
pub use rules::RuleBasedExtractor;

// ============================================================================
// Extractor Trait
// ============================================================================

/// Trait for proposition extractors
#[async_trait]
pub trait PropositionExtractor: Send + Sync {
    /// Decompose one paragraph into atomic statements, in reading order.
    async fn extract(&self, paragraph: &str) -> Result<Vec<String>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Paragraph loader
// ============================================================================

/// Split raw document text into paragraphs on blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an extractor from config
pub fn create_extractor(config: &ExtractorConfig) -> Result<Arc<dyn PropositionExtractor>> {
    match config.provider {
        ExtractorProvider::Gemini => Ok(Arc::new(GeminiExtractor::from_config(config)?)),
        ExtractorProvider::Rules => Ok(Arc::new(RuleBasedExtractor::new())),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_paragraphs_on_blank_lines() {
        let text = "First paragraph\nstill first.\n\nSecond paragraph.\n\n\n\nThird.";
        let paragraphs = split_paragraphs(text);

        assert_eq!(paragraphs.len(), 3);
        assert_eq!(paragraphs[0], "First paragraph\nstill first.");
        assert_eq!(paragraphs[1], "Second paragraph.");
        assert_eq!(paragraphs[2], "Third.");
    }

    #[test]
    fn test_split_paragraphs_drops_whitespace_only() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs("\n\n   \n\n").is_empty());
    }

    #[test]
    fn test_factory_rules_provider() {
        let config = ExtractorConfig {
            provider: ExtractorProvider::Rules,
            ..Default::default()
        };
        let extractor = create_extractor(&config).unwrap();
        assert_eq!(extractor.name(), "rules");
    }

    #[test]
    fn test_factory_gemini_requires_key() {
        let config = ExtractorConfig {
            provider: ExtractorProvider::Gemini,
            google_api_key: None,
            ..Default::default()
        };
        assert!(create_extractor(&config).is_err());
    }
}
