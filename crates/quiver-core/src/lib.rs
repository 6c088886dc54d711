//! Quiver Core - Domain models, errors, and shared types
//!
//! This crate defines the core abstractions used throughout the Quiver
//! pipeline:
//! - Proposition and vector record models
//! - Query match and report types
//! - Common error types
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, EmbeddingConfig, ExtractorConfig, ExtractorProvider, IndexConfig,
    LoggingConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Metadata attached to a stored vector: a flat mapping of key to JSON value.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Quiver operations
#[derive(Error, Debug)]
pub enum QuiverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dimension mismatch for record '{id}': expected {expected}, got {got}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        got: usize,
    },

    #[error("Authentication rejected: {0}")]
    Authentication(String),

    #[error("Index or namespace not found: {0}")]
    NotFound(String),

    #[error("Network timeout during {0}")]
    Timeout(String),

    #[error("Malformed response from {context}: {payload}")]
    MalformedResponse { context: String, payload: String },

    #[error("Vector index error: {0}")]
    Index(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Proposition extraction error: {0}")]
    Extraction(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuiverError {
    /// Whether the whole operation may simply be re-invoked.
    ///
    /// Upsert-by-id, query, and fetch are all idempotent, so a timed-out
    /// call is safe to repeat as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Fatal errors abort the process before (or instead of) further
    /// network calls.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Authentication(_) | Self::NotFound(_)
        )
    }

    /// Short remediation hint logged next to the error class.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::Config(_) => "set the named environment variable and re-run",
            Self::DimensionMismatch { .. } => {
                "the embedding model and index dimension disagree; re-create the index or change the model"
            }
            Self::Authentication(_) => "check QUIVER_API_KEY against the index credentials",
            Self::NotFound(_) => "check QUIVER_INDEX_HOST and QUIVER_NAMESPACE",
            Self::Timeout(_) => "transient; re-run the command, all operations are idempotent",
            Self::MalformedResponse { .. } => {
                "the raw payload is included above; the service may have changed its response shape"
            }
            Self::Index(_) => "see the index service response above",
            Self::Embedding(_) => "see the embedding failure above",
            Self::Extraction(_) => "see the extractor failure above",
            Self::Other(_) => "see the underlying error above",
        }
    }
}

impl From<ConfigError> for QuiverError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuiverError>;

// ============================================================================
// Propositions
// ============================================================================

/// A short, self-contained factual statement extracted from a paragraph.
///
/// Propositions are immutable once extracted; `source_index` is the
/// statement's position within the originating ingestion batch and fixes
/// the record id it will be stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposition {
    /// Statement text
    pub content: String,

    /// Position within the originating batch
    pub source_index: usize,
}

impl Proposition {
    pub fn new(content: impl Into<String>, source_index: usize) -> Self {
        Self {
            content: content.into(),
            source_index,
        }
    }

    /// Stable record id for this proposition (`prop_<source_index>`).
    pub fn record_id(&self) -> String {
        format!("prop_{}", self.source_index)
    }
}

// ============================================================================
// Vector Records
// ============================================================================

/// The unit of storage in the vector index.
///
/// An upsert with the same `id` replaces the entire stored record,
/// metadata included: upserting without metadata leaves the stored record
/// with no metadata at all. Records that must remain queryable by text
/// therefore always carry `metadata["content"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Stable identifier, e.g. `prop_0`
    pub id: String,

    /// Embedding values; length must equal the index dimension
    pub values: Vec<f32>,

    /// Key/value metadata; absent means the stored record has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorRecord {
    /// A record without metadata. Fetch-only paths and tests use this;
    /// the ingestion path never does.
    pub fn bare(id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            values,
            metadata: None,
        }
    }

    /// A record carrying `metadata["content"]`, the shape every queryable
    /// record must have.
    pub fn with_content(id: impl Into<String>, values: Vec<f32>, content: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("content".to_string(), content.into());
        Self {
            id: id.into(),
            values,
            metadata: Some(metadata),
        }
    }

    /// Content text, if the record carries the canonical metadata key.
    pub fn content(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
    }

    /// True when metadata is present and non-empty.
    pub fn has_metadata(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| !m.is_empty())
    }
}

// ============================================================================
// Query Results
// ============================================================================

/// A ranked nearest-neighbor match.
///
/// `metadata` is present only when the query requested it. Ordering among
/// equal scores is unspecified by the index service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,

    /// Similarity score, higher is closer
    pub score: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

// ============================================================================
// Documents
// ============================================================================

/// Ingestion input: a titled body of raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub text: String,
}

impl Document {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            text: text.into(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Batch position within the run
    pub batch_index: usize,

    /// Records in this batch
    pub size: usize,

    /// Error message if the batch failed; `None` means committed
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Partial-success result of a batched upsert.
///
/// There is no transactional guarantee across batches: a failure leaves
/// earlier batches committed and later batches unattempted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertReport {
    /// Records written to the index
    pub written: usize,

    /// Records not written (failed or unattempted batches)
    pub failed: usize,

    /// Per-batch outcomes, in dispatch order; batches after the first
    /// failure are not listed because they were never attempted
    pub batches: Vec<BatchOutcome>,
}

impl UpsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Indices of committed batches.
    pub fn committed_batches(&self) -> Vec<usize> {
        self.batches
            .iter()
            .filter(|b| b.succeeded())
            .map(|b| b.batch_index)
            .collect()
    }
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub document_id: Uuid,
    pub paragraphs: usize,
    pub propositions: usize,
    pub upsert: UpsertReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Summary of one metadata repair run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    /// Pairs supplied to the run
    pub total: usize,

    /// Records whose stored vector values were reused
    pub reused: usize,

    /// Records freshly embedded because no stored values existed
    pub reembedded: usize,

    /// Upsert outcome for the rebuilt records
    pub upsert: UpsertReport,
}

// ============================================================================
// Tests
// ============================================================================
