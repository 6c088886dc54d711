//! Quiver Index - Vector index abstraction
//!
//! Provides the [`VectorIndex`] trait over namespaced upsert / top-K
//! query / fetch, a Pinecone REST implementation, and an in-memory
//! implementation with the same replace-on-upsert semantics for offline
//! use and tests.

use async_trait::async_trait;
use quiver_core::{
    BatchOutcome, QueryMatch, QuiverError, Result, UpsertReport, VectorRecord,
};
use std::collections::HashMap;

pub mod memory;
pub mod pinecone;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// Trait for vector index operations.
///
/// Upsert is keyed by id with last-write-wins, full-replace semantics:
/// the stored record becomes exactly what was sent, so an upsert without
/// metadata erases previously stored metadata. All operations are
/// idempotent and safe to re-invoke after a timeout.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write records (insert-or-replace); returns the count written.
    ///
    /// Sends a single request; large sequences go through
    /// [`upsert_in_batches`].
    async fn upsert(&self, records: &[VectorRecord], namespace: Option<&str>) -> Result<usize>;

    /// Top-K nearest neighbors, sorted by descending score. Metadata is
    /// present on matches only when `include_metadata` is set.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>>;

    /// Fetch records by id. Absent ids are simply missing from the map,
    /// not an error. Used by repair and verification, never by the query
    /// path.
    async fn fetch(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, VectorRecord>>;

    /// Configured index dimension.
    fn dimension(&self) -> usize;
}

// ============================================================================
// Dimension validation
// ============================================================================

/// Check every record against the index dimension.
///
/// Runs before any network call; the error names the offending record.
pub fn validate_dimensions(records: &[VectorRecord], expected: usize) -> Result<()> {
    for record in records {
        if record.values.len() != expected {
            return Err(QuiverError::DimensionMismatch {
                id: record.id.clone(),
                expected,
                got: record.values.len(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Batched upsert
// ============================================================================

/// Upsert a record sequence in fixed-size batches.
///
/// All records are dimension-validated up front, so a malformed record
/// fails the whole call before anything is sent. Batches commit
/// independently and there is no rollback: the first batch failure stops
/// the run, and the report lists what was committed, what failed, and
/// what was never attempted.
pub async fn upsert_in_batches(
    index: &dyn VectorIndex,
    records: &[VectorRecord],
    namespace: Option<&str>,
    batch_size: usize,
) -> Result<UpsertReport> {
    validate_dimensions(records, index.dimension())?;

    let batch_size = batch_size.max(1);
    let mut report = UpsertReport::default();

    for (batch_index, batch) in records.chunks(batch_size).enumerate() {
        match index.upsert(batch, namespace).await {
            Ok(written) => {
                tracing::debug!(batch_index, written, "batch committed");
                report.written += written;
                report.batches.push(BatchOutcome {
                    batch_index,
                    size: batch.len(),
                    error: None,
                });
            }
            Err(err) => {
                tracing::warn!(batch_index, error = %err, "batch failed, stopping run");
                report.failed = records.len() - report.written;
                report.batches.push(BatchOutcome {
                    batch_index,
                    size: batch.len(),
                    error: Some(err.to_string()),
                });
                break;
            }
        }
    }

    Ok(report)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, len: usize) -> VectorRecord {
        VectorRecord::with_content(id, vec![0.5; len], "text")
    }

    #[test]
    fn test_validate_dimensions_names_offender() {
        let records = vec![record("prop_0", 4), record("prop_1", 3)];
        let err = validate_dimensions(&records, 4).unwrap_err();

        match err {
            QuiverError::DimensionMismatch { id, expected, got } => {
                assert_eq!(id, "prop_1");
                assert_eq!(expected, 4);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_batched_upsert_splits_and_counts() {
        let index = MemoryIndex::new(4);
        let records: Vec<_> = (0..450).map(|i| record(&format!("prop_{i}"), 4)).collect();

        let report = upsert_in_batches(&index, &records, None, 200).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.written, 450);
        assert_eq!(report.batches.len(), 3);
        assert_eq!(
            report.batches.iter().map(|b| b.size).collect::<Vec<_>>(),
            vec![200, 200, 50]
        );
    }

    #[tokio::test]
    async fn test_batched_upsert_rejects_mismatch_before_any_write() {
        let index = MemoryIndex::new(384);
        let mut records: Vec<_> = (0..3).map(|i| record(&format!("prop_{i}"), 384)).collect();
        records.push(record("prop_3", 128));

        let err = upsert_in_batches(&index, &records, None, 2).await.unwrap_err();
        assert!(matches!(err, QuiverError::DimensionMismatch { .. }));

        // Nothing was written, not even the valid leading batch.
        let fetched = index
            .fetch(&["prop_0".to_string()], None)
            .await
            .unwrap();
        assert!(fetched.is_empty());
    }
}
