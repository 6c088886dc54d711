//! Local sentence-embedding model backed by fastembed
//!
//! The first call loads the model (network fetch or local cache, can take
//! tens of seconds); the handle is memoized for the process lifetime.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use quiver_core::{QuiverError, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default model identifier; output dimension 384.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Locally-run sentence embedder.
///
/// The model handle lives in an owned `OnceCell` rather than module-level
/// state, so initialization happens exactly once per embedder and callers
/// can force it eagerly with [`ensure_initialized`](Self::ensure_initialized).
pub struct MiniLmEmbedder {
    model_name: String,
    model: EmbeddingModel,
    dimension: usize,
    handle: OnceCell<Arc<TextEmbedding>>,
}

impl std::fmt::Debug for MiniLmEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniLmEmbedder")
            .field("model_name", &self.model_name)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("initialized", &self.handle.initialized())
            .finish()
    }
}

impl MiniLmEmbedder {
    /// Create an embedder for a named model.
    ///
    /// Changing the model changes the output dimension and invalidates
    /// any index created with a different dimension.
    pub fn new(model_name: &str) -> Result<Self> {
        let (model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
            other => {
                return Err(QuiverError::Config(format!(
                    "unknown embedding model: {other}"
                )))
            }
        };

        Ok(Self {
            model_name: model_name.to_string(),
            model,
            dimension,
            handle: OnceCell::new(),
        })
    }

    /// Force model initialization now instead of on first embed.
    ///
    /// Initialization failure (network, model not found) is fatal to the
    /// operation; nothing is retried here.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.model_handle().await?;
        Ok(())
    }

    /// True once the model has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn model_handle(&self) -> Result<Arc<TextEmbedding>> {
        self.handle
            .get_or_try_init(|| async {
                let model = self.model.clone();
                let name = self.model_name.clone();
                tracing::info!(model = %name, "loading embedding model (one-time)");

                let loaded = tokio::task::spawn_blocking(move || {
                    TextEmbedding::try_new(
                        InitOptions::new(model).with_show_download_progress(false),
                    )
                })
                .await
                .map_err(|e| QuiverError::Embedding(format!("model load task failed: {e}")))?
                .map_err(|e| {
                    QuiverError::Embedding(format!(
                        "initialization of embedding model '{name}' failed: {e}"
                    ))
                })?;

                tracing::info!(model = %name, "embedding model ready");
                Ok(Arc::new(loaded))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl super::Embedder for MiniLmEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut results = self.embed_batch(&texts).await?;
        results.pop().ok_or_else(|| {
            QuiverError::Embedding(format!(
                "no embedding returned for '{}'",
                identify(text)
            ))
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model_handle().await?;
        let owned = texts.to_vec();
        let first = identify(&texts[0]);
        let count = texts.len();

        // Inference is blocking CPU work; keep it off the async runtime.
        let embeddings = tokio::task::spawn_blocking(move || model.embed(owned, None))
            .await
            .map_err(|e| QuiverError::Embedding(format!("embedding task failed: {e}")))?
            .map_err(|e| {
                QuiverError::Embedding(format!(
                    "embedding {count} texts starting at '{first}' failed: {e}"
                ))
            })?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Short identity for a text in error messages.
fn identify(text: &str) -> String {
    const MAX: usize = 48;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(MAX).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Embedder;

    #[test]
    fn test_model_dimensions() {
        let embedder = MiniLmEmbedder::new("all-MiniLM-L6-v2").unwrap();
        assert_eq!(embedder.dimension(), 384);

        let embedder = MiniLmEmbedder::new("nomic-embed-text-v1.5").unwrap();
        assert_eq!(embedder.dimension(), 768);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let err = MiniLmEmbedder::new("word2vec").unwrap_err();
        assert!(err.to_string().contains("word2vec"));
    }

    #[test]
    fn test_not_initialized_until_first_embed() {
        let embedder = MiniLmEmbedder::new(DEFAULT_MODEL).unwrap();
        assert!(!embedder.is_initialized());
    }

    #[test]
    fn test_identify_truncates() {
        let long = "x".repeat(200);
        let id = identify(&long);
        assert!(id.len() < 60);
        assert!(id.ends_with("..."));
        assert_eq!(identify("short"), "short");
    }

    #[tokio::test]
    #[ignore = "downloads the model; run with --ignored when network is available"]
    async fn test_embed_returns_model_dimension() {
        let embedder = MiniLmEmbedder::new(DEFAULT_MODEL).unwrap();
        embedder.ensure_initialized().await.unwrap();
        assert!(embedder.is_initialized());

        let vector = embedder.embed("The sky is blue.").await.unwrap();
        assert_eq!(vector.len(), 384);

        let batch = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.len() == 384));
    }
}
