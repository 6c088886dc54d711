//! Quiver Pipeline - Ingestion and retrieval orchestration
//!
//! This crate sequences the two straight-line flows of the system:
//! - ingestion: extract propositions → embed → upsert with metadata
//! - query: embed → top-K search → shape matches for display
//!
//! There is no cross-invocation state beyond what the vector index
//! itself persists. The same index may have been populated by producers
//! using different metadata key conventions, so display shaping follows
//! a declared key-precedence policy instead of assuming one fixed key.
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use quiver_core::{
    Document, IngestReport, Metadata, Proposition, QuiverError, Result, UpsertReport,
    VectorRecord,
};
use quiver_embed::Embedder;
use quiver_extract::{split_paragraphs, PropositionExtractor};
use quiver_index::{upsert_in_batches, VectorIndex};
use std::sync::Arc;
use uuid::Uuid;

pub mod repair;

pub use repair::{MetadataRepair, RepairPair};

// ============================================================================
// Display shaping
// ============================================================================

/// Declared precedence for extracting display text from match metadata.
///
/// Keys are tried in order; the first non-empty string value wins. A
/// metadata map matching none of the keys is dumped whole, and absent
/// metadata yields the explicit marker.
#[derive(Debug, Clone)]
pub struct DisplayPolicy {
    keys: Vec<String>,
    missing_marker: String,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self::new(["content", "text", "chunk"], "[no metadata]")
    }
}

impl DisplayPolicy {
    pub fn new<I, S>(keys: I, missing_marker: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            missing_marker: missing_marker.into(),
        }
    }

    /// Shape one match's metadata into display text.
    pub fn display_text(&self, metadata: Option<&Metadata>) -> String {
        let Some(metadata) = metadata else {
            return self.missing_marker.clone();
        };
        if metadata.is_empty() {
            return self.missing_marker.clone();
        }

        for key in &self.keys {
            if let Some(value) = metadata.get(key).and_then(|v| v.as_str()) {
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }

        serde_json::to_string(metadata).unwrap_or_else(|_| self.missing_marker.clone())
    }
}

/// A query match shaped for presentation.
#[derive(Debug, Clone)]
pub struct RetrievedMatch {
    pub id: String,

    /// Similarity score, higher is closer
    pub score: f32,

    /// Text resolved through the display policy
    pub display_text: String,

    /// Raw metadata as returned by the index
    pub metadata: Option<Metadata>,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ingestion and query orchestrator.
pub struct Pipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    extractor: Arc<dyn PropositionExtractor>,
    namespace: Option<String>,
    batch_size: usize,
    fetch_batch_size: usize,
    display: DisplayPolicy,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("embedder_dimension", &self.embedder.dimension())
            .field("index_dimension", &self.index.dimension())
            .field("extractor", &self.extractor.name())
            .field("namespace", &self.namespace)
            .field("batch_size", &self.batch_size)
            .field("fetch_batch_size", &self.fetch_batch_size)
            .field("display", &self.display)
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline over the given components.
    ///
    /// Fails immediately when the embedder and index disagree on
    /// dimension, before any document work or network write.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        extractor: Arc<dyn PropositionExtractor>,
        namespace: Option<String>,
    ) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(QuiverError::DimensionMismatch {
                id: "<embedder>".to_string(),
                expected: index.dimension(),
                got: embedder.dimension(),
            });
        }

        Ok(Self {
            embedder,
            index,
            extractor,
            namespace,
            batch_size: 200,
            fetch_batch_size: 100,
            display: DisplayPolicy::default(),
        })
    }

    /// Override the upsert batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the display policy.
    pub fn with_display_policy(mut self, display: DisplayPolicy) -> Self {
        self.display = display;
        self
    }

    /// Extract propositions from document text, paragraph by paragraph.
    ///
    /// `source_index` numbers propositions across the whole document, so
    /// record ids stay stable regardless of paragraph boundaries.
    pub async fn extract_propositions(&self, text: &str) -> Result<(usize, Vec<Proposition>)> {
        let paragraphs = split_paragraphs(text);
        tracing::info!(
            paragraphs = paragraphs.len(),
            extractor = self.extractor.name(),
            "extracting propositions"
        );

        let mut propositions: Vec<Proposition> = Vec::new();
        for (i, paragraph) in paragraphs.iter().enumerate() {
            let extracted = self.extractor.extract(paragraph).await?;
            tracing::info!(
                paragraph = i + 1,
                total = paragraphs.len(),
                statements = extracted.len(),
                "paragraph processed"
            );
            for content in extracted {
                tracing::debug!(statement = %content, "extracted");
                let source_index = propositions.len();
                propositions.push(Proposition::new(content, source_index));
            }
        }

        Ok((paragraphs.len(), propositions))
    }

    /// Ingest a document: extract, embed, and upsert.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, title = %document.title, "ingestion started");

        let (paragraphs, propositions) = self.extract_propositions(&document.text).await?;
        let upsert = self.ingest_propositions(&propositions).await?;

        if upsert.is_complete() {
            tracing::info!(%run_id, written = upsert.written, "ingestion complete");
        } else {
            tracing::warn!(
                %run_id,
                written = upsert.written,
                failed = upsert.failed,
                committed_batches = ?upsert.committed_batches(),
                "ingestion partially committed"
            );
        }

        Ok(IngestReport {
            run_id,
            document_id: document.id,
            paragraphs,
            propositions: propositions.len(),
            upsert,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Embed and upsert an already-extracted proposition batch.
    ///
    /// Every record is built through [`VectorRecord::with_content`], so
    /// the ingestion path cannot emit a metadata-less upsert; a later
    /// bare upsert to the same id would destroy the stored metadata.
    pub async fn ingest_propositions(&self, propositions: &[Proposition]) -> Result<UpsertReport> {
        if propositions.is_empty() {
            return Ok(UpsertReport::default());
        }

        let texts: Vec<String> = propositions.iter().map(|p| p.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let records: Vec<VectorRecord> = propositions
            .iter()
            .zip(vectors)
            .map(|(prop, values)| {
                VectorRecord::with_content(prop.record_id(), values, &prop.content)
            })
            .collect();

        tracing::info!(records = records.len(), "upserting vectors");
        upsert_in_batches(
            self.index.as_ref(),
            &records,
            self.namespace.as_deref(),
            self.batch_size,
        )
        .await
    }

    /// Answer a natural-language query with the top-K stored statements.
    pub async fn query(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedMatch>> {
        tracing::info!(top_k, "query started");

        let vector = self.embedder.embed(question).await?;
        let matches = self
            .index
            .query(&vector, top_k, self.namespace.as_deref(), true)
            .await?;

        tracing::info!(matches = matches.len(), "query returned");

        Ok(matches
            .into_iter()
            .map(|m| {
                let display_text = self.display.display_text(m.metadata.as_ref());
                RetrievedMatch {
                    id: m.id,
                    score: m.score,
                    display_text,
                    metadata: m.metadata,
                }
            })
            .collect())
    }

    /// Metadata repair tool over the same components and namespace.
    pub fn repair(&self) -> MetadataRepair {
        MetadataRepair::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            self.namespace.clone(),
        )
        .with_batch_sizes(self.batch_size, self.fetch_batch_size)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_display_prefers_content() {
        let policy = DisplayPolicy::default();
        let m = metadata(&[("content", "from content"), ("text", "from text")]);
        assert_eq!(policy.display_text(Some(&m)), "from content");
    }

    #[test]
    fn test_display_falls_back_through_key_order() {
        let policy = DisplayPolicy::default();

        let m = metadata(&[("text", "from text"), ("chunk", "from chunk")]);
        assert_eq!(policy.display_text(Some(&m)), "from text");

        let m = metadata(&[("chunk", "from chunk")]);
        assert_eq!(policy.display_text(Some(&m)), "from chunk");
    }

    #[test]
    fn test_display_skips_empty_and_non_string_values() {
        let policy = DisplayPolicy::default();

        let mut m = metadata(&[("text", "fallback")]);
        m.insert("content".to_string(), serde_json::Value::from(""));
        assert_eq!(policy.display_text(Some(&m)), "fallback");

        let mut m = Metadata::new();
        m.insert("content".to_string(), serde_json::Value::from(7));
        m.insert("text".to_string(), serde_json::Value::from("used"));
        assert_eq!(policy.display_text(Some(&m)), "used");
    }

    #[test]
    fn test_display_dumps_unrecognized_metadata() {
        let policy = DisplayPolicy::default();
        let m = metadata(&[("source", "elsewhere")]);
        let shaped = policy.display_text(Some(&m));
        assert!(shaped.contains("source"));
        assert!(shaped.contains("elsewhere"));
    }

    #[test]
    fn test_display_marks_absent_metadata() {
        let policy = DisplayPolicy::default();
        assert_eq!(policy.display_text(None), "[no metadata]");
        assert_eq!(policy.display_text(Some(&Metadata::new())), "[no metadata]");
    }

    #[test]
    fn test_display_custom_key_order() {
        let policy = DisplayPolicy::new(["chunk", "content"], "<empty>");
        let m = metadata(&[("content", "second"), ("chunk", "first")]);
        assert_eq!(policy.display_text(Some(&m)), "first");
        assert_eq!(policy.display_text(None), "<empty>");
    }
}
