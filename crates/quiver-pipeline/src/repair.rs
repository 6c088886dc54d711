//! Metadata repair tool
//!
//! Rebuilds `metadata.content` for a set of record ids after a
//! destructive overwrite (an upsert that omitted metadata replaces the
//! whole stored record, metadata included). Existing vector values are
//! reused rather than re-embedded; only ids with no stored values get a
//! fresh embedding. Running the repair twice with the same pairs
//! converges on the same stored state.

use quiver_core::{QuiverError, RepairReport, Result, VectorRecord};
use quiver_embed::Embedder;
use quiver_index::{upsert_in_batches, VectorIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One intended `(id, content)` pair, as listed in a repair manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairPair {
    pub id: String,
    pub content: String,
}

/// Reconciles intended content against the stored records.
pub struct MetadataRepair {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    namespace: Option<String>,
    batch_size: usize,
    fetch_batch_size: usize,
}

impl MetadataRepair {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            namespace,
            batch_size: 200,
            fetch_batch_size: 100,
        }
    }

    pub fn with_batch_sizes(mut self, batch_size: usize, fetch_batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self.fetch_batch_size = fetch_batch_size;
        self
    }

    /// Repair metadata for every pair.
    ///
    /// Postcondition: each id carries `metadata.content` equal to its
    /// pair, with original vector values preserved where they existed.
    pub async fn run(&self, pairs: &[RepairPair]) -> Result<RepairReport> {
        if pairs.is_empty() {
            return Ok(RepairReport {
                total: 0,
                reused: 0,
                reembedded: 0,
                upsert: Default::default(),
            });
        }

        duplicate_check(pairs)?;

        let ids: Vec<String> = pairs.iter().map(|p| p.id.clone()).collect();
        tracing::info!(ids = ids.len(), "fetching existing records");

        let mut existing: HashMap<String, VectorRecord> = HashMap::new();
        for chunk in ids.chunks(self.fetch_batch_size.max(1)) {
            let fetched = self.index.fetch(chunk, self.namespace.as_deref()).await?;
            existing.extend(fetched);
        }

        // Reuse stored values wherever the record still has them; collect
        // the rest for one embedding batch.
        let mut records: Vec<Option<VectorRecord>> = Vec::with_capacity(pairs.len());
        let mut missing: Vec<usize> = Vec::new();
        let mut reused = 0;

        for (i, pair) in pairs.iter().enumerate() {
            match existing.get(&pair.id).filter(|r| !r.values.is_empty()) {
                Some(stored) => {
                    reused += 1;
                    records.push(Some(VectorRecord::with_content(
                        pair.id.clone(),
                        stored.values.clone(),
                        &pair.content,
                    )));
                }
                None => {
                    records.push(None);
                    missing.push(i);
                }
            }
        }

        if !missing.is_empty() {
            tracing::info!(count = missing.len(), "embedding records with no stored values");
            let texts: Vec<String> = missing.iter().map(|&i| pairs[i].content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            for (&i, values) in missing.iter().zip(vectors) {
                records[i] = Some(VectorRecord::with_content(
                    pairs[i].id.clone(),
                    values,
                    &pairs[i].content,
                ));
            }
        }

        let records: Vec<VectorRecord> = records.into_iter().flatten().collect();
        let upsert = upsert_in_batches(
            self.index.as_ref(),
            &records,
            self.namespace.as_deref(),
            self.batch_size,
        )
        .await?;

        tracing::info!(
            total = pairs.len(),
            reused,
            reembedded = missing.len(),
            written = upsert.written,
            "repair finished"
        );

        Ok(RepairReport {
            total: pairs.len(),
            reused,
            reembedded: missing.len(),
            upsert,
        })
    }
}

/// A manifest with the same id twice has no well-defined outcome under
/// last-write-wins; refuse it up front.
fn duplicate_check(pairs: &[RepairPair]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for pair in pairs {
        if !seen.insert(pair.id.as_str()) {
            return Err(QuiverError::Index(format!(
                "duplicate id in repair manifest: {}",
                pair.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_rejected() {
        let pairs = vec![
            RepairPair {
                id: "prop_0".to_string(),
                content: "a".to_string(),
            },
            RepairPair {
                id: "prop_0".to_string(),
                content: "b".to_string(),
            },
        ];
        assert!(duplicate_check(&pairs).is_err());
    }

    #[test]
    fn test_manifest_round_trips_as_json() {
        let manifest = r#"[{"id": "prop_0", "content": "The sky is blue."}]"#;
        let pairs: Vec<RepairPair> = serde_json::from_str(manifest).unwrap();
        assert_eq!(pairs[0].id, "prop_0");
        assert_eq!(pairs[0].content, "The sky is blue.");
    }
}
