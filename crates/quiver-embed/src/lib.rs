//! Quiver Embed - Embedding generation
//!
//! Maps text to fixed-dimension vectors with a locally-run sentence
//! embedding model. The model handle is constructed lazily, once per
//! process, and reused for every subsequent call.

use async_trait::async_trait;
use quiver_core::{EmbeddingConfig, Result};
use std::sync::Arc;

pub mod cache;
pub mod minilm;

pub use cache::CachedEmbedder;
pub use minilm::MiniLmEmbedder;

// ============================================================================
// Embedder Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension; must equal the vector index dimension
    fn dimension(&self) -> usize;
}

// ============================================================================
// Factory function
// ============================================================================

/// Create the configured embedder, wrapped in the embedding cache.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let model = MiniLmEmbedder::new(&config.model)?;
    Ok(Arc::new(CachedEmbedder::with_capacity(
        Arc::new(model),
        config.cache_capacity,
        config.cache_ttl_secs,
    )))
}
