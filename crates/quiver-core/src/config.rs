//! Quiver Configuration Management
//!
//! Collects every environment read into one validated structure built
//! once at startup. A missing required variable fails fast, by name,
//! before any network call is attempted.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Vector index connection
    pub index: IndexConfig,

    /// Embedding model configuration
    pub embedding: EmbeddingConfig,

    /// Proposition extractor configuration
    pub extractor: ExtractorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `QUIVER_INDEX_HOST`, `QUIVER_API_KEY`. `GOOGLE_API_KEY`
    /// becomes required when the extractor provider is `gemini`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.index.host = require("QUIVER_INDEX_HOST")?;
        config.index.api_key = require("QUIVER_API_KEY")?;

        if let Ok(namespace) = std::env::var("QUIVER_NAMESPACE") {
            if !namespace.is_empty() {
                config.index.namespace = Some(namespace);
            }
        }
        if let Ok(dimension) = std::env::var("QUIVER_DIMENSION") {
            config.index.dimension =
                dimension.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "QUIVER_DIMENSION".to_string(),
                    value: dimension,
                })?;
        }
        if let Ok(timeout) = std::env::var("QUIVER_TIMEOUT_SECS") {
            config.index.timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "QUIVER_TIMEOUT_SECS".to_string(),
                    value: timeout,
                })?;
        }

        if let Ok(model) = std::env::var("QUIVER_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(provider) = std::env::var("QUIVER_EXTRACTOR") {
            config.extractor.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.extractor.google_api_key = Some(key);
        }
        if let Ok(model) = std::env::var("QUIVER_GEMINI_MODEL") {
            config.extractor.gemini_model = model;
        }
        if let Ok(timeout) = std::env::var("QUIVER_EXTRACT_TIMEOUT_SECS") {
            config.extractor.timeout_secs =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "QUIVER_EXTRACT_TIMEOUT_SECS".to_string(),
                    value: timeout,
                })?;
        }

        if let Ok(filter) = std::env::var("QUIVER_LOG") {
            config.logging.filter = filter;
        }

        // The Gemini credential is only meaningful for the gemini
        // provider, but for that provider its absence is a startup error.
        if config.extractor.provider == ExtractorProvider::Gemini
            && config.extractor.google_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired("GOOGLE_API_KEY".to_string()));
        }

        Ok(config)
    }

    /// Configuration for offline runs: in-memory index, rule-based
    /// extractor, no credentials read.
    pub fn offline() -> Self {
        let mut config = Self::default();
        config.extractor.provider = ExtractorProvider::Rules;
        if let Ok(filter) = std::env::var("QUIVER_LOG") {
            config.logging.filter = filter;
        }
        config
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingRequired(key.to_string())),
    }
}

/// Vector index connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index data-plane endpoint, e.g. `https://qv-abc123.svc.us-east-1.pinecone.io`
    pub host: String,

    /// Per-request credential
    pub api_key: String,

    /// Optional logical partition; ingestion and query must agree on it
    pub namespace: Option<String>,

    /// Vector dimension (must match the embedding model)
    pub dimension: usize,

    /// Records per upsert request
    pub batch_size: usize,

    /// Ids per fetch request
    pub fetch_batch_size: usize,

    /// Data-plane request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            api_key: String::new(),
            namespace: None,
            dimension: 384, // all-MiniLM-L6-v2
            batch_size: 200,
            fetch_batch_size: 100,
            timeout_secs: 30,
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier; changing it changes the output dimension and
    /// invalidates any index created with a different dimension
    pub model: String,

    /// Maximum entries in the embedding cache
    pub cache_capacity: u64,

    /// Cache entry time-to-live in seconds
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            cache_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Proposition extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Extraction provider
    pub provider: ExtractorProvider,

    /// Gemini API key (required for the gemini provider)
    pub google_api_key: Option<String>,

    /// Gemini model name
    pub gemini_model: String,

    /// LLM request timeout in seconds; model calls are slower than
    /// data-plane calls
    pub timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            provider: ExtractorProvider::Gemini,
            google_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Supported extraction providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorProvider {
    #[default]
    Gemini,
    /// Sentence-boundary splitting, no network
    Rules,
}

impl std::str::FromStr for ExtractorProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "rules" => Ok(Self::Rules),
            _ => Err(ConfigError::InvalidValue {
                key: "QUIVER_EXTRACTOR".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Subscriber filter directive (e.g. `info`, `quiver=debug`)
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
