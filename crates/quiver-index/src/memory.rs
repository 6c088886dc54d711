//! In-memory vector index
//!
//! Faithful stand-in for the hosted index: namespaced, cosine-scored,
//! and upsert replaces the whole stored record, metadata included,
//! matching the destructive semantics of the remote store. Backs offline
//! runs and the test suite.

use async_trait::async_trait;
use quiver_core::{QueryMatch, QuiverError, Result, VectorRecord};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process vector index with last-write-wins upserts.
pub struct MemoryIndex {
    dimension: usize,
    // namespace -> id -> record; "" is the no-namespace partition
    namespaces: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl MemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Records stored in a namespace.
    pub fn len(&self, namespace: Option<&str>) -> usize {
        self.namespaces
            .read()
            .map(|ns| ns.get(key(namespace)).map_or(0, |m| m.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, namespace: Option<&str>) -> bool {
        self.len(namespace) == 0
    }
}

fn key(namespace: Option<&str>) -> &str {
    namespace.unwrap_or("")
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl super::VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[VectorRecord], namespace: Option<&str>) -> Result<usize> {
        super::validate_dimensions(records, self.dimension)?;

        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| QuiverError::Index("memory index lock poisoned".to_string()))?;
        let partition = namespaces.entry(key(namespace).to_string()).or_default();

        for record in records {
            // Full replace: a record without metadata erases whatever
            // metadata the id previously carried.
            partition.insert(record.id.clone(), record.clone());
        }

        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>> {
        if vector.len() != self.dimension {
            return Err(QuiverError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dimension,
                got: vector.len(),
            });
        }

        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| QuiverError::Index("memory index lock poisoned".to_string()))?;

        let mut matches: Vec<QueryMatch> = namespaces
            .get(key(namespace))
            .map(|partition| {
                partition
                    .values()
                    .map(|record| QueryMatch {
                        id: record.id.clone(),
                        score: cosine(vector, &record.values),
                        metadata: if include_metadata {
                            record.metadata.clone()
                        } else {
                            None
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn fetch(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, VectorRecord>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| QuiverError::Index("memory index lock poisoned".to_string()))?;

        let mut found = HashMap::new();
        if let Some(partition) = namespaces.get(key(namespace)) {
            for id in ids {
                if let Some(record) = partition.get(id) {
                    found.insert(id.clone(), record.clone());
                }
            }
        }

        Ok(found)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
